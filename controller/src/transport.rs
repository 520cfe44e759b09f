use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use irclimate_common::{EngineAction, TransportConfig};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport disabled: {0}")]
    NotConfigured(String),
    #[error("failed to encode command payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to publish command: {0}")]
    Publish(#[from] rumqttc::ClientError),
}

/// One-way command channel. `send` resolves once the emission has been
/// handed off; there is no delivery acknowledgment.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Identifiers of the emitting hardware, for log context.
    fn target(&self) -> String;

    async fn send(&self, key: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Serialize)]
struct RemoteSendCommand<'a> {
    entity_id: &'a str,
    device: &'a str,
    command: &'a str,
}

/// Broadlink remote: a `remote.send_command` request published over MQTT.
pub struct BroadlinkTransport {
    mqtt: AsyncClient,
    controller: String,
    controlled_device: String,
    command_topic: String,
}

#[async_trait]
impl CommandTransport for BroadlinkTransport {
    fn backend(&self) -> &'static str {
        "broadlink"
    }

    fn target(&self) -> String {
        format!(
            "controller={} device={}",
            self.controller, self.controlled_device
        )
    }

    async fn send(&self, key: &str) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(&RemoteSendCommand {
            entity_id: &self.controller,
            device: &self.controlled_device,
            command: key,
        })?;
        self.mqtt
            .publish(&self.command_topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct QaSendCommand<'a> {
    entity_id: &'a str,
    profile: &'a str,
    device: &'a str,
    command: &'a str,
}

/// QA hub: the command key is resolved against a named command profile on
/// the hub behind `qa_entity`.
pub struct QaTransport {
    mqtt: AsyncClient,
    qa_profile: String,
    controlled_device: String,
    qa_entity: String,
    command_topic: String,
}

#[async_trait]
impl CommandTransport for QaTransport {
    fn backend(&self) -> &'static str {
        "qa"
    }

    fn target(&self) -> String {
        format!(
            "entity={} profile={} device={}",
            self.qa_entity, self.qa_profile, self.controlled_device
        )
    }

    async fn send(&self, key: &str) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(&QaSendCommand {
            entity_id: &self.qa_entity,
            profile: &self.qa_profile,
            device: &self.controlled_device,
            command: key,
        })?;
        self.mqtt
            .publish(&self.command_topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// Stand-in for a transport whose configuration is incomplete. Every send
/// fails with the configuration error.
pub struct DisabledTransport {
    backend: &'static str,
    reason: String,
}

#[async_trait]
impl CommandTransport for DisabledTransport {
    fn backend(&self) -> &'static str {
        self.backend
    }

    fn target(&self) -> String {
        "disabled".to_string()
    }

    async fn send(&self, _key: &str) -> Result<(), TransportError> {
        Err(TransportError::NotConfigured(self.reason.clone()))
    }
}

pub fn build_transport(
    climate: &str,
    config: &TransportConfig,
    mqtt: AsyncClient,
) -> Box<dyn CommandTransport> {
    if let Err(err) = config.validate() {
        error!("[{climate}] {err}; commands will not be sent");
        return Box::new(DisabledTransport {
            backend: config.backend(),
            reason: err.to_string(),
        });
    }

    match config {
        TransportConfig::Broadlink {
            controller,
            controlled_device,
            command_topic,
        } => Box::new(BroadlinkTransport {
            mqtt,
            controller: controller.clone(),
            controlled_device: controlled_device.clone(),
            command_topic: command_topic.clone(),
        }),
        TransportConfig::Qa {
            qa_profile,
            controlled_device,
            qa_entity,
            command_topic,
        } => Box::new(QaTransport {
            mqtt,
            qa_profile: qa_profile.clone(),
            controlled_device: controlled_device.clone(),
            qa_entity: qa_entity.clone(),
            command_topic: command_topic.clone(),
        }),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportDiagnostics {
    pub backend: &'static str,
    pub target: String,
    #[serde(rename = "sentCommands")]
    pub sent_commands: u64,
    #[serde(rename = "failedCommands")]
    pub failed_commands: u64,
    #[serde(rename = "suppressedCommands")]
    pub suppressed_commands: u64,
    #[serde(rename = "lastCommand")]
    pub last_command: Option<String>,
    #[serde(rename = "lastSendEpoch")]
    pub last_send_epoch: Option<i64>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

/// Executes engine actions against a transport and keeps counters.
pub struct Dispatcher {
    climate: String,
    transport: Box<dyn CommandTransport>,
    stats: Mutex<TransportDiagnostics>,
}

impl Dispatcher {
    pub fn new(climate: impl Into<String>, transport: Box<dyn CommandTransport>) -> Self {
        let stats = TransportDiagnostics {
            backend: transport.backend(),
            target: transport.target(),
            ..TransportDiagnostics::default()
        };
        Self {
            climate: climate.into(),
            transport,
            stats: Mutex::new(stats),
        }
    }

    /// Returns true when a command was handed to the transport successfully.
    /// Failures are logged and counted, never retried.
    pub async fn execute(&self, action: EngineAction) -> bool {
        let key = match action {
            EngineAction::SuppressOff => {
                debug!(
                    "[{}] power sensor already reports off, not sending off",
                    self.climate
                );
                self.record(|stats| {
                    stats.suppressed_commands = stats.suppressed_commands.saturating_add(1)
                });
                return false;
            }
            EngineAction::Send(key) => key,
        };

        info!(
            "[{}] IR -> {} ({})",
            self.climate,
            key,
            self.transport.target()
        );

        match self.transport.send(&key).await {
            Ok(()) => {
                self.record(|stats| {
                    stats.sent_commands = stats.sent_commands.saturating_add(1);
                    stats.last_command = Some(key.clone());
                    stats.last_send_epoch = Some(Utc::now().timestamp());
                    stats.last_error = None;
                });
                true
            }
            Err(err) => {
                warn!(
                    "[{}] failed to send {} ({}): {err}",
                    self.climate,
                    key,
                    self.transport.target()
                );
                self.record(|stats| {
                    stats.failed_commands = stats.failed_commands.saturating_add(1);
                    stats.last_error = Some(err.to_string());
                });
                false
            }
        }
    }

    pub fn diagnostics(&self) -> TransportDiagnostics {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn record(&self, update: impl FnOnce(&mut TransportDiagnostics)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}
