//! Downstream bus connection and outbound message model.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use zenoh::Session;
use zenoh::bytes::{Encoding, ZBytes};

use tracksight_common::{AssetRecord, Format, ZenohConfig, connect, encode};

use crate::config::TrackingConfig;
use crate::status::BridgeStatus;

/// Routing property carrying the asset's stable identifier.
pub const PROP_ASSET_UID: &str = "AssetUidId";

/// Routing property carrying the asset's human-readable name.
pub const PROP_ASSET_NAME: &str = "AssetName";

/// Error opening or releasing the bus connection. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Failed to open bus connection: {0}")]
    Open(String),
    #[error("Failed to close bus connection: {0}")]
    Close(String),
}

/// Error publishing a single message. Recoverable; the cycle skips to the
/// next message.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize message: {0}")]
    Serialization(String),
    #[error("Failed to publish to {key}: {message}")]
    Transport { key: String, message: String },
}

/// Connection state of the downstream bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Disabled,
    NoNetwork,
    Retrying,
    Expired,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Disabled => "disabled",
            ConnectionStatus::NoNetwork => "no_network",
            ConnectionStatus::Retrying => "retrying",
            ConnectionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason code accompanying a connection status transition.
///
/// `RetryExpired` and `ClientClose` are terminal: the transport can no longer
/// exchange messages without a fresh process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    ConnectionOk,
    ExpiredSasToken,
    DeviceDisabled,
    RetryExpired,
    ClientClose,
    CommunicationError,
    NoNetwork,
    BadCredential,
}

impl StatusReason {
    /// Whether this reason marks a state from which in-process recovery is
    /// impossible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusReason::RetryExpired | StatusReason::ClientClose)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::ConnectionOk => "connection_ok",
            StatusReason::ExpiredSasToken => "expired_sas_token",
            StatusReason::DeviceDisabled => "device_disabled",
            StatusReason::RetryExpired => "retry_expired",
            StatusReason::ClientClose => "client_close",
            StatusReason::CommunicationError => "communication_error",
            StatusReason::NoNetwork => "no_network",
            StatusReason::BadCredential => "bad_credential",
        }
    }
}

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handler invoked on every connection status transition.
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus, StatusReason) + Send + Sync>;

/// One message bound for the bus, wrapping a single serialized asset record.
///
/// Built fresh per record and discarded after the publish call returns.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Serialized asset record.
    pub body: Vec<u8>,
    /// MIME type of the body.
    pub content_type: &'static str,
    /// Body text encoding, where one applies.
    pub content_encoding: Option<&'static str>,
    /// Routing properties used by downstream consumers for filtering.
    pub properties: HashMap<String, String>,
}

impl OutboundMessage {
    /// Build the outbound message for one asset record.
    pub fn from_record(record: &AssetRecord, format: Format) -> Result<Self, PublishError> {
        let body =
            encode(record, format).map_err(|e| PublishError::Serialization(e.to_string()))?;

        let mut properties = HashMap::new();
        properties.insert(PROP_ASSET_UID.to_string(), record.uid.clone());
        properties.insert(PROP_ASSET_NAME.to_string(), record.name.clone());

        Ok(Self {
            body,
            content_type: format.mime_type(),
            content_encoding: format.content_encoding(),
            properties,
        })
    }
}

/// Connection to the downstream message bus.
///
/// The cycle and supervisor only see this seam; the production implementation
/// is [`ZenohBus`].
pub trait BusConnection: Send + Sync {
    /// Register the single handler invoked on status transitions. Must be
    /// registered before traffic flows.
    fn on_status_change(&self, handler: StatusHandler);

    /// Publish one message. No internal retry; the retry policy lives in the
    /// caller.
    fn publish(
        &self,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Publish a bridge status document.
    fn publish_status(
        &self,
        status: &BridgeStatus,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Release the connection. Idempotent.
    fn close(&self) -> impl Future<Output = Result<(), ConnectError>> + Send;
}

/// Tracks the last reported (status, reason) pair and forwards transitions to
/// the registered handler, at most once per actual change.
#[derive(Default)]
pub struct StatusTracker {
    handler: Mutex<Option<StatusHandler>>,
    last: Mutex<Option<(ConnectionStatus, StatusReason)>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the transition handler.
    pub fn set_handler(&self, handler: StatusHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    /// Report a transition. Suppressed if it matches the last reported pair.
    pub fn report(&self, status: ConnectionStatus, reason: StatusReason) {
        {
            let mut last = self.last.lock().unwrap();
            if *last == Some((status, reason)) {
                return;
            }
            *last = Some((status, reason));
        }

        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(status, reason);
        }
    }
}

/// Production bus connection backed by a Zenoh session.
///
/// Asset messages go to the fixed key `{key_prefix}/{output}`; the routing
/// properties ride as a JSON attachment and the content type maps to the
/// payload encoding.
pub struct ZenohBus {
    session: Session,
    key: String,
    status_key: String,
    tracker: StatusTracker,
    closed: AtomicBool,
}

impl ZenohBus {
    /// Open the connection to Zenoh.
    pub async fn open(
        zenoh: &ZenohConfig,
        tracking: &TrackingConfig,
    ) -> Result<Self, ConnectError> {
        let session = connect(zenoh)
            .await
            .map_err(|e| ConnectError::Open(e.to_string()))?;

        tracing::info!(zid = %session.zid(), "Connected to Zenoh");

        Ok(Self {
            session,
            key: tracking.output_key(),
            status_key: tracking.status_key(),
            tracker: StatusTracker::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// The fixed key asset messages are published to.
    pub fn output_key(&self) -> &str {
        &self.key
    }

    fn encoding_for(content_type: &str) -> Encoding {
        match content_type {
            "application/json" => Encoding::APPLICATION_JSON,
            "application/cbor" => Encoding::APPLICATION_CBOR,
            _ => Encoding::default(),
        }
    }
}

impl BusConnection for ZenohBus {
    fn on_status_change(&self, handler: StatusHandler) {
        self.tracker.set_handler(handler);
        // The session opened before the handler existed; deliver that
        // transition now that someone is listening.
        self.tracker
            .report(ConnectionStatus::Connected, StatusReason::ConnectionOk);
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        let attachment = serde_json::to_vec(&message.properties).unwrap_or_default();

        let result = self
            .session
            .put(&self.key, message.body.clone())
            .encoding(Self::encoding_for(message.content_type))
            .attachment(ZBytes::from(attachment))
            .await;

        match result {
            Ok(()) => {
                self.tracker
                    .report(ConnectionStatus::Connected, StatusReason::ConnectionOk);
                Ok(())
            }
            Err(e) => {
                self.tracker.report(
                    ConnectionStatus::Disconnected,
                    StatusReason::CommunicationError,
                );
                Err(PublishError::Transport {
                    key: self.key.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn publish_status(&self, status: &BridgeStatus) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(status)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        self.session
            .put(&self.status_key, payload)
            .encoding(Encoding::APPLICATION_JSON)
            .await
            .map_err(|e| PublishError::Transport {
                key: self.status_key.clone(),
                message: e.to_string(),
            })
    }

    async fn close(&self) -> Result<(), ConnectError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.tracker
            .report(ConnectionStatus::Disconnected, StatusReason::ClientClose);

        self.session
            .close()
            .await
            .map_err(|e| ConnectError::Close(e.to_string()))
    }
}
