//! Connection status and active-session data model.
//!
//! Exactly one `ConnectionStatus` instance exists per application session,
//! owned by the controller and published over a watch channel. Components
//! request transitions; they never write status directly.

use serde::{Deserialize, Serialize};

use seedlink_ble::TransportHandle;

/// Which acquisition path the controller is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Ble,
    Nfc,
}

/// The authoritative connection state, published to the hosting application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Scanning,
    Connecting,
    AwaitingOtp,
    Authenticating,
    Connected,
    /// Reached from `Connected` when the remote device drops the link
    /// without warning; the wallet is locked as a safety measure.
    Locked,
}

/// At most one session is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveSession {
    Ble {
        device_id: String,
        transport: TransportHandle,
    },
    Nfc {
        tag_uid: Vec<u8>,
    },
}

impl ActiveSession {
    pub fn kind(&self) -> TransportKind {
        match self {
            ActiveSession::Ble { .. } => TransportKind::Ble,
            ActiveSession::Nfc { .. } => TransportKind::Nfc,
        }
    }
}
