//! Verdant: a telemetry and actuator-control backend for grow-zone
//! controllers.
//!
//! Controllers push environmental reports over HTTP; reads are served
//! through a TTL+LRU query cache with stampede suppression; actuator
//! commands travel to devices over MQTT and settle through an action-log
//! state machine; a daily sweeper enforces a rolling retention window on
//! the time-series collections.

pub mod application;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod store;
