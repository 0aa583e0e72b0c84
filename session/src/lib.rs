//! Credential derivation and session controller.
//!
//! Owns the single authoritative [`ConnectionStatus`] and the at-most-one
//! [`ActiveSession`], drives either transport end to end, derives the wallet
//! mnemonic when applicable, and hands the result to the external keyring
//! collaborator. Everything else in the application only observes status
//! changes; nothing mutates connection state directly.

pub mod config;
pub mod controller;
pub mod error;
pub mod keyring;
pub mod status;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::{SessionError, SessionResult};
pub use keyring::{Keyring, KeyringError, KeyringEvent, MockKeyring};
pub use status::{ActiveSession, ConnectionStatus, TransportKind};
