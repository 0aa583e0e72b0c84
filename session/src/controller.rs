//! The session controller.
//!
//! Single owner of `ConnectionStatus` and `ActiveSession`. Transitions are
//! serialized behind an async mutex even though the underlying I/O suspends;
//! transports and the hosting application only ever request transitions.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use seedlink_ble::{
    BleAdapter, BleError, BleManager, BleSession, DeviceEvent, DeviceScanner, ScanHandle,
};
use seedlink_codec::{entropy_to_mnemonic, MnemonicPhrase, RawEntropy};
use seedlink_nfc::{NfcError, NfcTransport, SectorKey, TagReader};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::keyring::Keyring;
use crate::status::{ActiveSession, ConnectionStatus, TransportKind};

struct Inner {
    transport: TransportKind,
    active: Option<ActiveSession>,
    /// Live BLE link backing `active` on the BLE path.
    ble_session: Option<BleSession>,
}

/// Orchestrates either transport to produce a wallet credential and
/// publishes connection state to the rest of the application.
pub struct SessionController {
    ble: Arc<BleManager>,
    scanner: DeviceScanner,
    nfc: NfcTransport,
    keyring: Arc<dyn Keyring>,
    config: SessionConfig,
    status_tx: watch::Sender<ConnectionStatus>,
    inner: Arc<Mutex<Inner>>,
}

impl SessionController {
    pub fn new(
        adapter: Arc<dyn BleAdapter>,
        reader: Arc<dyn TagReader>,
        keyring: Arc<dyn Keyring>,
        config: SessionConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            ble: Arc::new(BleManager::with_otp_timeout(
                Arc::clone(&adapter),
                config.otp_timeout,
            )),
            scanner: DeviceScanner::new(adapter),
            nfc: NfcTransport::new(reader),
            keyring,
            config,
            status_tx,
            inner: Arc::new(Mutex::new(Inner {
                transport: TransportKind::Ble,
                active: None,
                ble_session: None,
            })),
        }
    }

    /// Read-only subscription to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub async fn active_session(&self) -> Option<ActiveSession> {
        self.inner.lock().await.active.clone()
    }

    pub async fn transport(&self) -> TransportKind {
        self.inner.lock().await.transport
    }

    /// Switch the acquisition path, resetting any previous session.
    pub async fn select_transport(&self, kind: TransportKind) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        inner.transport = kind;
        self.publish(ConnectionStatus::Disconnected);
        debug!(?kind, "transport selected");
    }

    /// Start BLE discovery; device add/remove events arrive on `events_tx`.
    pub async fn begin_discovery(
        &self,
        events_tx: mpsc::UnboundedSender<DeviceEvent>,
    ) -> SessionResult<ScanHandle> {
        {
            let inner = self.inner.lock().await;
            if inner.active.is_some() {
                return Err(SessionError::SessionAlreadyActive);
            }
        }
        self.publish(ConnectionStatus::Scanning);
        match self.scanner.start_scan(events_tx).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.publish(ConnectionStatus::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Stop discovery. Safe to call after the scan already ended.
    pub fn end_discovery(&self, handle: &ScanHandle) {
        handle.stop();
        if self.status() == ConnectionStatus::Scanning {
            self.publish(ConnectionStatus::Disconnected);
        }
    }

    /// Connect to a selected device: `Connecting -> AwaitingOtp`.
    pub async fn connect_ble(&self, device_id: &str) -> SessionResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.active.is_some() {
            return Err(SessionError::SessionAlreadyActive);
        }

        self.publish(ConnectionStatus::Connecting);
        match self.ble.connect(device_id).await {
            Ok(session) => {
                inner.active = Some(ActiveSession::Ble {
                    device_id: device_id.to_string(),
                    transport: session.handle().clone(),
                });
                inner.ble_session = Some(session);
                self.publish(ConnectionStatus::AwaitingOtp);
                Ok(())
            }
            Err(e) => {
                self.publish(ConnectionStatus::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Submit the pairing OTP: `AwaitingOtp -> Authenticating -> Connected`.
    ///
    /// `Ok(false)` means the device rejected the code; status returns to
    /// `AwaitingOtp` and the caller may prompt again. On success the session
    /// is handed to the keyring and an unsolicited-disconnect watch is armed.
    pub async fn submit_otp(&self, code: &str) -> SessionResult<bool> {
        let mut inner = self.inner.lock().await;
        let mut session = inner
            .ble_session
            .take()
            .ok_or(SessionError::NoActiveSession)?;
        if session.otp_consumed() {
            // Already paired; refuse the code without touching the live link
            inner.ble_session = Some(session);
            return Err(BleError::OtpAlreadyConsumed.into());
        }

        self.publish(ConnectionStatus::Authenticating);
        match self.ble.send_otp(&mut session, code).await {
            Ok(true) => {
                if let Err(e) = self
                    .keyring
                    .create_wallet_from_hardware_session(session.device_id(), session.handle())
                    .await
                {
                    self.ble.disconnect(&session).await;
                    inner.active = None;
                    self.publish(ConnectionStatus::Disconnected);
                    return Err(e.into());
                }
                self.arm_disconnect_watch(&session);
                inner.ble_session = Some(session);
                self.publish(ConnectionStatus::Connected);
                Ok(true)
            }
            Ok(false) => {
                inner.ble_session = Some(session);
                self.publish(ConnectionStatus::AwaitingOtp);
                Ok(false)
            }
            Err(e) => {
                // Link is gone or challenge spent; never leave AwaitingOtp
                self.ble.disconnect(&session).await;
                inner.active = None;
                self.publish(ConnectionStatus::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Drive the whole BLE pairing in one call. A rejected OTP tears the
    /// session down and fails with [`SessionError::OtpRejected`]; use
    /// [`Self::connect_ble`] + [`Self::submit_otp`] for interactive retry.
    pub async fn complete_ble_flow(&self, device_id: &str, otp: &str) -> SessionResult<()> {
        self.connect_ble(device_id).await?;
        match self.submit_otp(otp).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.reload().await;
                Err(SessionError::OtpRejected)
            }
            Err(e) => Err(e),
        }
    }

    /// Drive one single-shot NFC session end to end: open, authenticate,
    /// read the entropy blocks, derive the mnemonic, hand it to the keyring.
    ///
    /// The tag reader is released on every exit path, including the stalled
    /// case, which is bounded by `nfc_session_timeout`.
    pub async fn complete_nfc_flow(&self, key: &SectorKey) -> SessionResult<MnemonicPhrase> {
        let mut inner = self.inner.lock().await;
        if inner.active.is_some() {
            return Err(SessionError::SessionAlreadyActive);
        }

        self.publish(ConnectionStatus::Connecting);
        let mut session = match self.nfc.begin_session(self.config.tag_detect_timeout).await {
            Ok(session) => session,
            Err(e) => {
                self.publish(ConnectionStatus::Disconnected);
                return Err(e.into());
            }
        };
        inner.active = Some(ActiveSession::Nfc {
            tag_uid: session.tag().uid.clone(),
        });
        self.publish(ConnectionStatus::Authenticating);

        let io = async {
            for sector in self.config.entropy_sectors() {
                session
                    .authenticate_sector(sector, key, self.config.key_role)
                    .await?;
            }
            session.read_blocks(&self.config.entropy_blocks).await
        };
        let io_result = tokio::time::timeout(self.config.nfc_session_timeout, io).await;

        // Single-shot: the session closes no matter what happened above
        session.close().await;
        inner.active = None;

        let mut bytes = match io_result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                self.publish(ConnectionStatus::Disconnected);
                return Err(e.into());
            }
            Err(_) => {
                warn!("NFC session stalled; torn down by timeout");
                self.publish(ConnectionStatus::Disconnected);
                return Err(NfcError::IoTimeout.into());
            }
        };

        bytes.truncate(self.config.entropy_len);
        let mnemonic = RawEntropy::new(bytes)
            .and_then(|entropy| entropy_to_mnemonic(entropy.as_bytes()));
        let mnemonic = match mnemonic {
            Ok(mnemonic) => mnemonic,
            Err(e) => {
                self.publish(ConnectionStatus::Disconnected);
                return Err(e.into());
            }
        };

        if let Err(e) = self.keyring.create_wallet_from_mnemonic(&mnemonic).await {
            self.publish(ConnectionStatus::Disconnected);
            return Err(e.into());
        }

        info!(words = mnemonic.word_count(), "credential derived from tag");
        self.publish(ConnectionStatus::Connected);
        Ok(mnemonic)
    }

    /// Unsolicited disconnect: lock the wallet and clear the session. This
    /// is a state transition, not an error — subscribers observing `Locked`
    /// return the application to its unauthenticated entry point.
    pub async fn handle_remote_disconnect(&self) {
        remote_disconnect(&self.ble, &self.inner, &*self.keyring, &self.status_tx).await;
    }

    /// Recoverable re-entry: tear down whatever is active and return to
    /// `Disconnected` so the flow can be retried without an app restart.
    pub async fn reload(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        self.publish(ConnectionStatus::Disconnected);
    }

    fn arm_disconnect_watch(&self, session: &BleSession) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.ble.on_disconnected(session, move || {
            let _ = tx.send(());
        });
        let ble = Arc::clone(&self.ble);
        let inner = Arc::clone(&self.inner);
        let keyring = Arc::clone(&self.keyring);
        let status_tx = self.status_tx.clone();
        tokio::spawn(async move {
            if rx.recv().await.is_some() {
                remote_disconnect(&ble, &inner, &*keyring, &status_tx).await;
            }
        });
    }

    async fn teardown(&self, inner: &mut Inner) {
        if let Some(session) = inner.ble_session.take() {
            self.ble.disconnect(&session).await;
        }
        inner.active = None;
    }

    fn publish(&self, status: ConnectionStatus) {
        publish(&self.status_tx, status);
    }
}

fn publish(status_tx: &watch::Sender<ConnectionStatus>, status: ConnectionStatus) {
    let previous = status_tx.send_replace(status);
    if previous != status {
        debug!(?previous, ?status, "connection status");
    }
}

/// Unsolicited-disconnect handling, shared between the controller method and
/// the watch task armed at pairing time. No-op when an explicit path already
/// tore the session down.
async fn remote_disconnect(
    ble: &BleManager,
    inner: &Mutex<Inner>,
    keyring: &dyn Keyring,
    status_tx: &watch::Sender<ConnectionStatus>,
) {
    let mut inner = inner.lock().await;
    if inner.active.is_none() {
        return;
    }
    warn!("remote device disconnected; locking wallet");
    if let Some(session) = inner.ble_session.take() {
        ble.disconnect(&session).await;
    }
    inner.active = None;
    keyring.lock_wallet().await;
    publish(status_tx, ConnectionStatus::Locked);
}
