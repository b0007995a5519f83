//! Broker connection: outbound command publishing and the inbound status
//! loop, built on `rumqttc`'s async client.

use std::sync::Arc;

use metrics::counter;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use crate::config::BrokerSettings;

use async_trait::async_trait;

use super::correlation::CommandLedger;
use super::topics::{self, STATUS_SUBSCRIPTION};
use super::{ActuatorCommand, BridgeError, CommandPayload, CommandSink, StatusPayload};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Outbound half of the bridge: accepts commands, publishes them on the
/// device's command topic and arms the acknowledgement timeout.
pub struct ActuatorBridge {
    client: AsyncClient,
    ledger: Arc<CommandLedger>,
    ack_timeout: Duration,
}

impl ActuatorBridge {
    /// Build the broker connection. The returned [`BridgeWorker`] owns the
    /// event loop and must be driven on its own task for anything to flow.
    pub fn connect(
        settings: &BrokerSettings,
        ledger: Arc<CommandLedger>,
    ) -> (Arc<Self>, BridgeWorker) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, settings.queue_capacity);
        let bridge = Arc::new(Self {
            client: client.clone(),
            ledger: ledger.clone(),
            ack_timeout: settings.ack_timeout(),
        });
        let worker = BridgeWorker {
            client,
            eventloop,
            ledger,
        };
        (bridge, worker)
    }

    /// Issue a command: log it, publish it, arm its timeout. The returned
    /// id names the action-log entry callers can poll for the outcome.
    ///
    /// A full publish queue does not fail the call; the command stays
    /// issued and settles as timed out unless the device answers anyway.
    pub async fn issue(&self, command: ActuatorCommand) -> Result<String, BridgeError> {
        let action_id = self.ledger.record_issued(&command).await?;
        counter!("verdant_bridge_command_total").increment(1);

        let topic = topics::command_topic(&command.device_id, command.actuator);
        let payload = CommandPayload {
            correlation_id: command.correlation_id,
            state: command.desired_state,
            issued_at: command.issued_at,
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|err| BridgeError::Payload(err.to_string()))?;

        if let Err(err) = self.client.try_publish(&topic, QoS::AtLeastOnce, false, body) {
            counter!("verdant_bridge_publish_dropped_total").increment(1);
            warn!(%topic, error = %err, "publish queue full, command will time out unanswered");
        }

        let ledger = self.ledger.clone();
        let timeout = self.ack_timeout;
        let correlation_id = command.correlation_id;
        tokio::spawn(async move {
            sleep(timeout).await;
            match ledger.expire(correlation_id).await {
                Ok(true) => counter!("verdant_bridge_timeout_total").increment(1),
                Ok(false) => {}
                Err(err) => error!(%correlation_id, error = %err, "failed to settle timed-out command"),
            }
        });

        Ok(action_id)
    }

    pub async fn shutdown(&self) {
        if let Err(err) = self.client.disconnect().await {
            debug!(error = %err, "broker disconnect on shutdown");
        }
    }
}

#[async_trait]
impl CommandSink for ActuatorBridge {
    async fn issue(&self, command: ActuatorCommand) -> Result<String, BridgeError> {
        ActuatorBridge::issue(self, command).await
    }
}

/// Inbound half: drives the event loop, re-subscribes after every
/// reconnect and routes status messages into the ledger.
pub struct BridgeWorker {
    client: AsyncClient,
    eventloop: EventLoop,
    ledger: Arc<CommandLedger>,
}

impl BridgeWorker {
    /// Run until the connection is shut down. Connection errors back off
    /// exponentially up to [`MAX_BACKOFF`]; a successful ConnAck resets
    /// the backoff and renews the status subscription.
    pub async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    backoff = INITIAL_BACKOFF;
                    info!(subscription = STATUS_SUBSCRIPTION, "broker connected");
                    if let Err(err) = self
                        .client
                        .try_subscribe(STATUS_SUBSCRIPTION, QoS::AtLeastOnce)
                    {
                        warn!(error = %err, "status subscription could not be queued");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    Self::handle_status(&self.ledger, publish).await;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!("broker requested disconnect, stopping bridge worker");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    counter!("verdant_bridge_reconnect_total").increment(1);
                    warn!(error = %err, backoff = ?backoff, "broker connection lost");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn handle_status(ledger: &CommandLedger, publish: Publish) {
        match dispatch_status(ledger, &publish.topic, &publish.payload).await {
            Ok(()) => {}
            Err(err) => warn!(topic = %publish.topic, error = %err, "status message dropped"),
        }
    }
}

/// Route one status message. Messages carrying a correlation id settle the
/// matching in-flight command; messages without one are unsolicited
/// device-driven events and get their own confirmed log entry.
async fn dispatch_status(
    ledger: &CommandLedger,
    topic: &str,
    payload: &[u8],
) -> Result<(), BridgeError> {
    let Some((device_id, actuator)) = topics::parse_status_topic(topic) else {
        debug!(%topic, "ignoring message outside the status namespace");
        return Ok(());
    };
    let status: StatusPayload =
        serde_json::from_slice(payload).map_err(|err| BridgeError::Payload(err.to_string()))?;

    match status.correlation_id {
        Some(correlation_id) => {
            if ledger.confirm(correlation_id).await? {
                counter!("verdant_bridge_ack_total").increment(1);
            }
        }
        None => {
            ledger
                .record_device_event(&device_id, actuator, status.state)
                .await?;
        }
    }
    Ok(())
}
