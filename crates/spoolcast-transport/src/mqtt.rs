// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print trigger over MQTT (TLS, port 8883).
//
// Each attempt opens a fresh broker connection whose network loop runs on its
// own task. That task reports the broker's CONNACK through a one-shot signal;
// the publisher waits a fixed grace window for it, publishes exactly once if
// accepted, and always tears the connection down before the next attempt.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::types::{CONTROL_USERNAME, MQTT_TLS_PORT};
use spoolcast_security::TlsContext;

use crate::message::{ControlMessage, request_topic};

/// Keep-alive interval announced to the broker.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Requests the client may queue before `publish` waits.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// How the broker answered a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Accepted,
    /// CONNACK with a non-success return code.
    Refused,
    /// The link died before any CONNACK arrived.
    LinkFailed,
}

/// Write side of the acknowledgment. Set at most once, from the network
/// loop task.
#[derive(Debug)]
pub struct AckSignal(oneshot::Sender<AckStatus>);

impl AckSignal {
    pub fn set(self, status: AckStatus) {
        // The waiter may already have given up.
        let _ = self.0.send(status);
    }
}

/// Read side of the acknowledgment.
#[derive(Debug)]
pub struct AckWaiter(oneshot::Receiver<AckStatus>);

impl AckWaiter {
    /// Wait up to `grace` for the acknowledgment. `None` means nothing
    /// arrived in time.
    pub async fn wait(self, grace: Duration) -> Option<AckStatus> {
        match timeout(grace, self.0).await {
            Ok(Ok(status)) => Some(status),
            // Loop ended without reporting.
            Ok(Err(_)) => Some(AckStatus::LinkFailed),
            Err(_) => None,
        }
    }
}

pub fn ack_channel() -> (AckSignal, AckWaiter) {
    let (tx, rx) = oneshot::channel();
    (AckSignal(tx), AckWaiter(rx))
}

/// Broker connection parameters for one attempt.
#[derive(Clone)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl fmt::Debug for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Opens broker connections. The returned link's network loop must set
/// `ack` when the broker answers.
#[allow(async_fn_in_trait)]
pub trait BrokerConnector {
    type Link: BrokerLink;

    async fn open(&self, endpoint: &BrokerEndpoint, ack: AckSignal) -> Result<Self::Link>;
}

/// A live broker connection.
#[allow(async_fn_in_trait)]
pub trait BrokerLink {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Disconnect and stop the network loop, waiting at most `grace`.
    async fn shutdown(self, grace: Duration);
}

/// `rumqttc` over the shared printer TLS context.
#[derive(Debug, Clone)]
pub struct RumqttConnector {
    tls: TlsContext,
}

impl RumqttConnector {
    pub fn new(tls: TlsContext) -> Self {
        Self { tls }
    }
}

impl BrokerConnector for RumqttConnector {
    type Link = RumqttLink;

    async fn open(&self, endpoint: &BrokerEndpoint, ack: AckSignal) -> Result<RumqttLink> {
        let mut options = MqttOptions::new(
            endpoint.client_id.clone(),
            endpoint.host.clone(),
            endpoint.port,
        );
        options.set_credentials(endpoint.username.clone(), endpoint.password.clone());
        options.set_keep_alive(endpoint.keep_alive);
        options.set_clean_session(true);
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
            self.tls.client_config(),
        )));

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let task = tokio::spawn(drive_event_loop(event_loop, ack));
        debug!(host = %endpoint.host, port = endpoint.port, "MQTT network loop started");
        Ok(RumqttLink { client, task })
    }
}

/// Poll the connection until it disconnects or fails, reporting the first
/// broker answer through `ack`.
async fn drive_event_loop(mut event_loop: EventLoop, ack: AckSignal) {
    let mut ack = Some(ack);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                let accepted = connack.code == ConnectReturnCode::Success;
                if let Some(signal) = ack.take() {
                    signal.set(if accepted {
                        AckStatus::Accepted
                    } else {
                        AckStatus::Refused
                    });
                }
                if accepted {
                    info!("MQTT connected");
                } else {
                    warn!(code = ?connack.code, "MQTT connection refused");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(event) => debug!(?event, "MQTT event"),
            Err(ConnectionError::ConnectionRefused(code)) => {
                warn!(?code, "MQTT connection refused");
                if let Some(signal) = ack.take() {
                    signal.set(AckStatus::Refused);
                }
                break;
            }
            Err(e) => {
                warn!(error = %e, "MQTT link failed");
                if let Some(signal) = ack.take() {
                    signal.set(AckStatus::LinkFailed);
                }
                break;
            }
        }
    }
}

/// Client handle plus the task running its network loop.
pub struct RumqttLink {
    client: AsyncClient,
    task: JoinHandle<()>,
}

impl BrokerLink for RumqttLink {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| SpoolcastError::Mqtt(e.to_string()))
    }

    async fn shutdown(self, grace: Duration) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request not queued");
        }
        let mut task = self.task;
        if timeout(grace, &mut task).await.is_err() {
            debug!("MQTT network loop did not stop, aborting");
            task.abort();
        }
    }
}

/// Where to send the print command.
#[derive(Clone)]
pub struct PublishTarget {
    pub broker_host: String,
    pub port: u16,
    pub access_code: String,
    pub serial: String,
}

impl PublishTarget {
    /// Target on the printer's TLS MQTT port.
    pub fn new(
        broker_host: impl Into<String>,
        access_code: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            broker_host: broker_host.into(),
            port: MQTT_TLS_PORT,
            access_code: access_code.into(),
            serial: serial.into(),
        }
    }
}

impl fmt::Debug for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishTarget")
            .field("broker_host", &self.broker_host)
            .field("port", &self.port)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// Publishes one print command with bounded connect-and-publish retries.
#[derive(Debug)]
pub struct ControlChannelPublisher<C> {
    connector: C,
    ack_grace: Duration,
    keep_alive: Duration,
}

impl<C: BrokerConnector> ControlChannelPublisher<C> {
    pub fn new(connector: C, ack_grace: Duration) -> Self {
        Self {
            connector,
            ack_grace,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    /// Build the command from `template_path` for `delivered_filename` and
    /// publish it. A bad template fails before any connection is opened.
    pub async fn publish(
        &self,
        template_path: &Path,
        delivered_filename: &str,
        target: &PublishTarget,
        max_attempts: u32,
    ) -> Result<()> {
        let message = ControlMessage::from_template_file(template_path, delivered_filename)?;
        self.publish_message(&message, target, max_attempts).await
    }

    /// Publish an already built command. Zero attempts fails with
    /// `PublishExhausted` without connecting.
    #[instrument(skip(self, message), fields(broker = %target.broker_host, serial = %target.serial))]
    pub async fn publish_message(
        &self,
        message: &ControlMessage,
        target: &PublishTarget,
        max_attempts: u32,
    ) -> Result<()> {
        let payload = message.payload()?;
        let topic = request_topic(&target.serial);

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "connecting to printer MQTT broker");
            let endpoint = BrokerEndpoint {
                host: target.broker_host.clone(),
                port: target.port,
                username: CONTROL_USERNAME.to_owned(),
                password: target.access_code.clone(),
                client_id: format!("spoolcast_{}", Uuid::new_v4().simple()),
                keep_alive: self.keep_alive,
            };

            let (signal, waiter) = ack_channel();
            let mut link = match self.connector.open(&endpoint, signal).await {
                Ok(link) => link,
                Err(e) => {
                    warn!(attempt, error = %e, "MQTT connection could not be opened");
                    continue;
                }
            };

            match waiter.wait(self.ack_grace).await {
                Some(AckStatus::Accepted) => {
                    let sent = link.publish(&topic, payload.clone()).await;
                    link.shutdown(self.ack_grace).await;
                    match sent {
                        Ok(()) => {
                            info!(topic = %topic, bytes = payload.len(), "print command published");
                            return Ok(());
                        }
                        Err(e) => warn!(attempt, error = %e, "publish failed"),
                    }
                }
                other => {
                    warn!(attempt, status = ?other, "broker did not acknowledge the connection");
                    link.shutdown(self.ack_grace).await;
                }
            }
        }

        Err(SpoolcastError::PublishExhausted {
            attempts: max_attempts,
        })
    }
}
