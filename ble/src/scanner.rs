//! Cancellable device discovery subscription.
//!
//! Scanning is a lazy, restartable sequence of presence events: duplicate
//! `Found` reports upsert idempotently, `Lost` removes, and a radio outage
//! clears the whole set. Devices without a name or that refuse connections
//! are never surfaced (they cannot be paired with).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::{BleAdapter, ScanEvent};
use crate::error::BleResult;
use crate::DeviceDescriptor;

/// Device-list updates delivered to the subscriber (a picker, typically).
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Added(DeviceDescriptor),
    Removed(String),
    RadioAvailable,
    RadioUnavailable,
}

/// Drives discovery and owns the discovered-device set.
pub struct DeviceScanner {
    adapter: Arc<dyn BleAdapter>,
}

impl DeviceScanner {
    pub fn new(adapter: Arc<dyn BleAdapter>) -> Self {
        Self { adapter }
    }

    /// Start scanning. Device events are forwarded on `events_tx` until the
    /// returned handle is stopped or the adapter's stream ends.
    pub async fn start_scan(
        &self,
        events_tx: mpsc::UnboundedSender<DeviceEvent>,
    ) -> BleResult<ScanHandle> {
        let mut scan_rx = self.adapter.start_scan().await?;
        let devices: Arc<Mutex<HashMap<String, DeviceDescriptor>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let token = CancellationToken::new();

        let task_devices = Arc::clone(&devices);
        let task_token = token.clone();
        let task_adapter = Arc::clone(&self.adapter);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    event = scan_rx.recv() => match event {
                        Some(event) => {
                            Self::apply(&task_devices, event, &events_tx);
                        }
                        None => {
                            debug!("scan stream ended");
                            break;
                        }
                    },
                }
            }
            task_adapter.stop_scan().await;
        });

        debug!("scan started");
        Ok(ScanHandle {
            token,
            devices,
            _task: task,
        })
    }

    fn apply(
        devices: &Mutex<HashMap<String, DeviceDescriptor>>,
        event: ScanEvent,
        events_tx: &mpsc::UnboundedSender<DeviceEvent>,
    ) {
        match event {
            ScanEvent::Found(descriptor) => {
                if !descriptor.is_selectable() {
                    return;
                }
                let mut set = devices.lock().unwrap();
                let is_new = set
                    .insert(descriptor.id.clone(), descriptor.clone())
                    .is_none();
                drop(set);
                // Duplicate reports for a known id upsert silently
                if is_new {
                    debug!(id = %descriptor.id, "device discovered");
                    let _ = events_tx.send(DeviceEvent::Added(descriptor));
                }
            }
            ScanEvent::Lost(id) => {
                if devices.lock().unwrap().remove(&id).is_some() {
                    debug!(id = %id, "device lost");
                    let _ = events_tx.send(DeviceEvent::Removed(id));
                }
            }
            ScanEvent::RadioAvailable => {
                let _ = events_tx.send(DeviceEvent::RadioAvailable);
            }
            ScanEvent::RadioUnavailable => {
                warn!("bluetooth radio unavailable, clearing device set");
                let ids: Vec<String> = devices.lock().unwrap().drain().map(|(id, _)| id).collect();
                for id in ids {
                    let _ = events_tx.send(DeviceEvent::Removed(id));
                }
                let _ = events_tx.send(DeviceEvent::RadioUnavailable);
            }
        }
    }
}

/// Unsubscribe handle for an active scan.
#[derive(Debug)]
pub struct ScanHandle {
    token: CancellationToken,
    devices: Arc<Mutex<HashMap<String, DeviceDescriptor>>>,
    _task: tokio::task::JoinHandle<()>,
}

impl ScanHandle {
    /// Stop scanning. Safe to call multiple times.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Snapshot of the currently discovered devices.
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.lock().unwrap().values().cloned().collect()
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        // A dropped handle must not leave the radio scanning
        self.token.cancel();
    }
}
