//! BLE connection manager for the seedlink pairing core.
//!
//! Device discovery is a cancellable subscription over the radio adapter's
//! event stream; connection attempts are serialized; the OTP handshake is
//! single-use and bounded so a dropped device can never leave a caller
//! hanging. The radio itself sits behind the [`BleAdapter`] trait; tests use
//! [`MockAdapter`].

pub mod adapter;
pub mod error;
pub mod manager;
pub mod scanner;

pub use adapter::{BleAdapter, MockAdapter, ScanEvent, TransportHandle};
pub use error::{BleError, BleResult};
pub use manager::{BleManager, BleSession};
pub use scanner::{DeviceEvent, DeviceScanner, ScanHandle};

use serde::{Deserialize, Serialize};

/// A device seen during scanning. Ephemeral: invalidated when scanning
/// restarts or the device disappears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub is_connectable: bool,
}

impl DeviceDescriptor {
    /// Whether the device should be offered in a picker: it must advertise
    /// a name and accept connections.
    pub fn is_selectable(&self) -> bool {
        self.is_connectable && self.name.is_some()
    }
}
