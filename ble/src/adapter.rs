//! BLE radio adapter interface.
//!
//! The platform BLE stack is wrapped behind [`BleAdapter`] so discovery,
//! connection, and the OTP exchange can be driven and tested without a
//! radio. [`MockAdapter`] scripts scan events, connection outcomes, and
//! unsolicited disconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::{BleError, BleResult};
use crate::DeviceDescriptor;

/// Presence events delivered by the radio while scanning.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Found(DeviceDescriptor),
    Lost(String),
    RadioAvailable,
    RadioUnavailable,
}

/// Opaque handle to an established link, owned by the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHandle {
    pub device_id: String,
    pub link_id: u64,
}

/// Driver interface to the platform BLE stack.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Begin scanning; events arrive on the returned stream until
    /// [`BleAdapter::stop_scan`] is called or the receiver is dropped.
    async fn start_scan(&self) -> BleResult<mpsc::UnboundedReceiver<ScanEvent>>;

    /// Stop an ongoing scan. Safe to call when no scan is running.
    async fn stop_scan(&self);

    /// Establish a link to the device.
    async fn connect(&self, device_id: &str) -> BleResult<TransportHandle>;

    /// Deliver an OTP code over the established link. `Ok(false)` means the
    /// device rejected the code.
    async fn send_otp(&self, handle: &TransportHandle, code: &str) -> BleResult<bool>;

    /// Observe link liveness: the receiver flips to `false` when the device
    /// disconnects.
    fn link_state(&self, handle: &TransportHandle) -> watch::Receiver<bool>;

    /// Drop the link. Idempotent.
    async fn disconnect(&self, handle: &TransportHandle);
}

// ── Mock implementation ──────────────────────────────────────────────

struct MockLink {
    alive_tx: watch::Sender<bool>,
    alive_rx: watch::Receiver<bool>,
}

/// Scripted adapter for tests.
pub struct MockAdapter {
    scan_script: Mutex<Vec<ScanEvent>>,
    scan_failure: Mutex<Option<BleError>>,
    reachable: Mutex<HashMap<String, bool>>,
    accepted_otp: String,
    connect_delay: Duration,
    otp_delay: Duration,
    next_link: AtomicU64,
    links: Mutex<HashMap<u64, MockLink>>,
    otp_attempts: AtomicU64,
    scan_stops: AtomicU64,
    hold_scan_open: AtomicBool,
    held_scan_tx: Mutex<Option<mpsc::UnboundedSender<ScanEvent>>>,
}

impl MockAdapter {
    pub fn new(accepted_otp: &str) -> Self {
        Self {
            scan_script: Mutex::new(Vec::new()),
            scan_failure: Mutex::new(None),
            reachable: Mutex::new(HashMap::new()),
            accepted_otp: accepted_otp.to_string(),
            connect_delay: Duration::from_millis(0),
            otp_delay: Duration::from_millis(0),
            next_link: AtomicU64::new(1),
            links: Mutex::new(HashMap::new()),
            otp_attempts: AtomicU64::new(0),
            scan_stops: AtomicU64::new(0),
            hold_scan_open: AtomicBool::new(false),
            held_scan_tx: Mutex::new(None),
        }
    }

    /// Keep the scan stream open after the script is replayed, as a real
    /// radio does until `stop_scan`.
    pub fn hold_scan_open(&self) {
        self.hold_scan_open.store(true, Ordering::Relaxed);
    }

    /// Queue scan events to replay when a scan starts.
    pub fn script_scan(&self, events: Vec<ScanEvent>) {
        *self.scan_script.lock().unwrap() = events;
    }

    /// Make the next `start_scan` fail, e.g. with a disabled radio.
    pub fn fail_next_scan(&self, err: BleError) {
        *self.scan_failure.lock().unwrap() = Some(err);
    }

    /// Register a device the adapter can (or cannot) connect to.
    pub fn set_reachable(&self, device_id: &str, reachable: bool) {
        self.reachable
            .lock()
            .unwrap()
            .insert(device_id.to_string(), reachable);
    }

    /// Stretch `connect` so connection races can be exercised.
    pub fn set_connect_delay(&mut self, delay: Duration) {
        self.connect_delay = delay;
    }

    /// Stretch `send_otp` so disconnect races can be exercised.
    pub fn set_otp_delay(&mut self, delay: Duration) {
        self.otp_delay = delay;
    }

    /// Simulate the remote device dropping the link.
    pub fn trigger_disconnect(&self, handle: &TransportHandle) {
        if let Some(link) = self.links.lock().unwrap().get(&handle.link_id) {
            let _ = link.alive_tx.send(false);
        }
    }

    pub fn otp_attempts(&self) -> u64 {
        self.otp_attempts.load(Ordering::Relaxed)
    }

    /// How many times `stop_scan` has been called.
    pub fn scan_stop_count(&self) -> u64 {
        self.scan_stops.load(Ordering::Relaxed)
    }

    fn link_alive(&self, handle: &TransportHandle) -> bool {
        self.links
            .lock()
            .unwrap()
            .get(&handle.link_id)
            .map(|l| *l.alive_rx.borrow())
            .unwrap_or(false)
    }
}

#[async_trait]
impl BleAdapter for MockAdapter {
    async fn start_scan(&self) -> BleResult<mpsc::UnboundedReceiver<ScanEvent>> {
        if let Some(err) = self.scan_failure.lock().unwrap().take() {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        for event in self.scan_script.lock().unwrap().iter().cloned() {
            let _ = tx.send(event);
        }
        if self.hold_scan_open.load(Ordering::Relaxed) {
            // Keep a sender alive so the stream outlives the script
            *self.held_scan_tx.lock().unwrap() = Some(tx);
        }
        Ok(rx)
    }

    async fn stop_scan(&self) {
        self.scan_stops.fetch_add(1, Ordering::Relaxed);
        self.held_scan_tx.lock().unwrap().take();
    }

    async fn connect(&self, device_id: &str) -> BleResult<TransportHandle> {
        if self.connect_delay > Duration::ZERO {
            tokio::time::sleep(self.connect_delay).await;
        }
        let reachable = self
            .reachable
            .lock()
            .unwrap()
            .get(device_id)
            .copied()
            .unwrap_or(false);
        if !reachable {
            return Err(BleError::DeviceUnreachable);
        }

        let link_id = self.next_link.fetch_add(1, Ordering::Relaxed);
        let (alive_tx, alive_rx) = watch::channel(true);
        self.links
            .lock()
            .unwrap()
            .insert(link_id, MockLink { alive_tx, alive_rx });
        Ok(TransportHandle {
            device_id: device_id.to_string(),
            link_id,
        })
    }

    async fn send_otp(&self, handle: &TransportHandle, code: &str) -> BleResult<bool> {
        self.otp_attempts.fetch_add(1, Ordering::Relaxed);
        if self.otp_delay > Duration::ZERO {
            tokio::time::sleep(self.otp_delay).await;
        }
        if !self.link_alive(handle) {
            return Err(BleError::DeviceUnreachable);
        }
        Ok(code == self.accepted_otp)
    }

    fn link_state(&self, handle: &TransportHandle) -> watch::Receiver<bool> {
        self.links
            .lock()
            .unwrap()
            .get(&handle.link_id)
            .map(|l| l.alive_rx.clone())
            .unwrap_or_else(|| watch::channel(false).1)
    }

    async fn disconnect(&self, handle: &TransportHandle) {
        if let Some(link) = self.links.lock().unwrap().remove(&handle.link_id) {
            let _ = link.alive_tx.send(false);
        }
    }
}
