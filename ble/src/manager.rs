//! Connection establishment and OTP handshake.
//!
//! Connection attempts are serialized: a second `connect` while one is
//! outstanding fails immediately instead of racing. The OTP challenge is
//! consumed exactly once (on acceptance); a rejected code may be retried.
//! Every OTP exchange is bounded — if the device drops mid-exchange the
//! pending call resolves `DeviceUnreachable` rather than hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapter::{BleAdapter, TransportHandle};
use crate::error::{BleError, BleResult};

/// Default bound on one OTP exchange.
pub const DEFAULT_OTP_TIMEOUT: Duration = Duration::from_secs(10);

/// An established link, created by [`BleManager::connect`].
pub struct BleSession {
    device_id: String,
    handle: TransportHandle,
    otp_consumed: bool,
    alive: watch::Receiver<bool>,
}

impl BleSession {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    /// Whether the link is still up.
    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Whether the pairing challenge has already been accepted.
    pub fn otp_consumed(&self) -> bool {
        self.otp_consumed
    }
}

impl std::fmt::Debug for BleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleSession")
            .field("device_id", &self.device_id)
            .field("handle", &self.handle)
            .field("otp_consumed", &self.otp_consumed)
            .field("alive", &*self.alive.borrow())
            .finish()
    }
}

/// Manages the exclusive BLE link to the hardware device.
pub struct BleManager {
    adapter: Arc<dyn BleAdapter>,
    connecting: AtomicBool,
    otp_timeout: Duration,
}

impl BleManager {
    pub fn new(adapter: Arc<dyn BleAdapter>) -> Self {
        Self::with_otp_timeout(adapter, DEFAULT_OTP_TIMEOUT)
    }

    pub fn with_otp_timeout(adapter: Arc<dyn BleAdapter>, otp_timeout: Duration) -> Self {
        Self {
            adapter,
            connecting: AtomicBool::new(false),
            otp_timeout,
        }
    }

    /// Connect to a discovered device.
    ///
    /// Serialized: while one attempt is outstanding any further call fails
    /// with [`BleError::ConnectionInProgress`] immediately. Radio-level
    /// failure surfaces as [`BleError::DeviceUnreachable`].
    pub async fn connect(&self, device_id: &str) -> BleResult<BleSession> {
        if self.connecting.swap(true, Ordering::AcqRel) {
            return Err(BleError::ConnectionInProgress);
        }
        debug!(device_id, "connecting");

        let result = self.adapter.connect(device_id).await;
        self.connecting.store(false, Ordering::Release);

        let handle = result?;
        let alive = self.adapter.link_state(&handle);
        info!(device_id, "link established");
        Ok(BleSession {
            device_id: device_id.to_string(),
            handle,
            otp_consumed: false,
            alive,
        })
    }

    /// Deliver the pairing OTP.
    ///
    /// `Ok(false)` means the device rejected the code and the caller may
    /// prompt again. `Ok(true)` consumes the challenge; any later call fails
    /// with [`BleError::OtpAlreadyConsumed`]. A disconnect or timeout during
    /// the exchange resolves to [`BleError::DeviceUnreachable`].
    pub async fn send_otp(&self, session: &mut BleSession, code: &str) -> BleResult<bool> {
        if session.otp_consumed {
            return Err(BleError::OtpAlreadyConsumed);
        }
        if !session.is_alive() {
            return Err(BleError::DeviceUnreachable);
        }

        let accepted = tokio::select! {
            result = self.adapter.send_otp(&session.handle, code) => result?,
            _ = wait_disconnected(session.alive.clone()) => {
                warn!(device_id = %session.device_id, "device dropped during OTP exchange");
                return Err(BleError::DeviceUnreachable);
            }
            _ = tokio::time::sleep(self.otp_timeout) => {
                warn!(device_id = %session.device_id, "OTP exchange timed out");
                return Err(BleError::DeviceUnreachable);
            }
        };

        if accepted {
            session.otp_consumed = true;
            info!(device_id = %session.device_id, "OTP accepted");
        } else {
            debug!(device_id = %session.device_id, "OTP rejected, retry allowed");
        }
        Ok(accepted)
    }

    /// Register a one-shot notification for an unsolicited disconnect.
    pub fn on_disconnected<F>(&self, session: &BleSession, callback: F) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let alive = session.alive.clone();
        tokio::spawn(async move {
            wait_disconnected(alive).await;
            callback();
        })
    }

    /// Tear the link down.
    pub async fn disconnect(&self, session: &BleSession) {
        self.adapter.disconnect(&session.handle).await;
        debug!(device_id = %session.device_id, "link closed");
    }
}

/// Resolve once the link reports down (or its sender is gone).
async fn wait_disconnected(mut alive: watch::Receiver<bool>) {
    loop {
        if !*alive.borrow() {
            return;
        }
        if alive.changed().await.is_err() {
            return;
        }
    }
}
