//! External keyring collaborator interface.
//!
//! The wallet engine that consumes the derived credential (encrypted
//! storage, biometric unlock, account derivation) lives outside this core.
//! It is reached through [`Keyring`]; tests use [`MockKeyring`], which
//! records every call.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use seedlink_ble::TransportHandle;
use seedlink_codec::MnemonicPhrase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    #[error("Vault creation failed: {0}")]
    VaultCreation(String),

    #[error("Hardware wallet registration failed: {0}")]
    HardwareRegistration(String),
}

/// Interface to the external wallet keyring.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Restore a wallet from a derived mnemonic (NFC path).
    async fn create_wallet_from_mnemonic(
        &self,
        mnemonic: &MnemonicPhrase,
    ) -> Result<(), KeyringError>;

    /// Register a live hardware session as the wallet's signer (BLE path).
    async fn create_wallet_from_hardware_session(
        &self,
        device_id: &str,
        transport: &TransportHandle,
    ) -> Result<(), KeyringError>;

    /// Lock the wallet. Invoked on unsolicited disconnect; must not fail.
    async fn lock_wallet(&self);
}

/// Calls observed by [`MockKeyring`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyringEvent {
    MnemonicWallet { word_count: usize },
    HardwareWallet { device_id: String },
    Locked,
}

/// Recording keyring for tests.
#[derive(Default)]
pub struct MockKeyring {
    events: Mutex<Vec<KeyringEvent>>,
    fail_next: Mutex<Option<KeyringError>>,
}

impl MockKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next wallet-creation call fail.
    pub fn fail_next(&self, err: KeyringError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn events(&self) -> Vec<KeyringEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn is_locked(&self) -> bool {
        self.events
            .lock()
            .unwrap()
            .last()
            .is_some_and(|e| *e == KeyringEvent::Locked)
    }

    fn take_failure(&self) -> Option<KeyringError> {
        self.fail_next.lock().unwrap().take()
    }
}

#[async_trait]
impl Keyring for MockKeyring {
    async fn create_wallet_from_mnemonic(
        &self,
        mnemonic: &MnemonicPhrase,
    ) -> Result<(), KeyringError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.events.lock().unwrap().push(KeyringEvent::MnemonicWallet {
            word_count: mnemonic.word_count(),
        });
        Ok(())
    }

    async fn create_wallet_from_hardware_session(
        &self,
        device_id: &str,
        _transport: &TransportHandle,
    ) -> Result<(), KeyringError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.events.lock().unwrap().push(KeyringEvent::HardwareWallet {
            device_id: device_id.to_string(),
        });
        Ok(())
    }

    async fn lock_wallet(&self) {
        self.events.lock().unwrap().push(KeyringEvent::Locked);
    }
}
