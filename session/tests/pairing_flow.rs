//! End-to-end pairing flows over mocked radio and tag-reader drivers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use seedlink_ble::{BleError, DeviceDescriptor, DeviceEvent, MockAdapter, ScanEvent};
use seedlink_nfc::{KeyRole, MockTagReader, NfcError, SectorKey};
use seedlink_session::{
    ConnectionStatus, KeyringEvent, MockKeyring, SessionConfig, SessionController, SessionError,
};

const OTP: &str = "4296";
// Reference card: entropy lives in sector 1, blocks 4 and 6, key B
const CARD_KEY_HEX: &str = "ffffffffffff";
const ENTROPY: [u8; 16] = [
    0x30, 0xd1, 0xbd, 0x74, 0x78, 0xbe, 0x8e, 0xc6, 0xcc, 0x09, 0x40, 0x12, 0xbd, 0x0b, 0x66,
    0x96,
];

fn secux_device() -> DeviceDescriptor {
    DeviceDescriptor {
        id: "AA:BB".to_string(),
        name: Some("SecuX W20".to_string()),
        is_connectable: true,
    }
}

fn ble_fixture() -> (Arc<MockAdapter>, Arc<MockKeyring>, Arc<SessionController>) {
    let adapter = Arc::new(MockAdapter::new(OTP));
    adapter.set_reachable("AA:BB", true);
    adapter.script_scan(vec![ScanEvent::Found(secux_device())]);

    let keyring = Arc::new(MockKeyring::new());
    let controller = Arc::new(SessionController::new(
        Arc::clone(&adapter) as _,
        Arc::new(MockTagReader::empty_field()),
        Arc::clone(&keyring) as _,
        SessionConfig::for_testing(),
    ));
    (adapter, keyring, controller)
}

fn card_key() -> SectorKey {
    SectorKey::from_hex(CARD_KEY_HEX).unwrap()
}

fn seed_card() -> MockTagReader {
    let mut reader = MockTagReader::with_tag(&[0x04, 0xa2, 0x2b, 0x19]);
    reader.set_key(1, KeyRole::B, card_key());
    reader.set_block(4, ENTROPY);
    reader.set_block(6, [0u8; 16]);
    reader
}

fn nfc_fixture(reader: MockTagReader) -> (Arc<MockTagReader>, Arc<MockKeyring>, Arc<SessionController>) {
    let reader = Arc::new(reader);
    let keyring = Arc::new(MockKeyring::new());
    let controller = Arc::new(SessionController::new(
        Arc::new(MockAdapter::new(OTP)),
        Arc::clone(&reader) as _,
        Arc::clone(&keyring) as _,
        SessionConfig::for_testing(),
    ));
    (reader, keyring, controller)
}

// ── BLE pairing ──────────────────────────────────────────────────────

#[tokio::test]
async fn ble_scan_connect_wrong_then_right_otp() {
    let (_adapter, keyring, controller) = ble_fixture();

    // Scan surfaces the device
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scan = controller.begin_discovery(tx).await.unwrap();
    assert_eq!(controller.status(), ConnectionStatus::Scanning);
    let event = tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, DeviceEvent::Added(d) if d.id == "AA:BB"));
    controller.end_discovery(&scan);

    // Connect, then the user types the wrong code first
    controller.connect_ble("AA:BB").await.unwrap();
    assert_eq!(controller.status(), ConnectionStatus::AwaitingOtp);

    assert!(!controller.submit_otp("0000").await.unwrap());
    assert_eq!(controller.status(), ConnectionStatus::AwaitingOtp);

    assert!(controller.submit_otp(OTP).await.unwrap());
    assert_eq!(controller.status(), ConnectionStatus::Connected);
    assert_eq!(
        keyring.events(),
        vec![KeyringEvent::HardwareWallet {
            device_id: "AA:BB".to_string()
        }]
    );
}

#[tokio::test]
async fn ble_complete_flow_one_call() {
    let (_adapter, keyring, controller) = ble_fixture();
    controller.complete_ble_flow("AA:BB", OTP).await.unwrap();
    assert_eq!(controller.status(), ConnectionStatus::Connected);
    assert_eq!(keyring.events().len(), 1);
}

#[tokio::test]
async fn ble_complete_flow_rejected_otp_reverts() {
    let (_adapter, keyring, controller) = ble_fixture();
    let err = controller.complete_ble_flow("AA:BB", "0000").await.unwrap_err();
    assert!(matches!(err, SessionError::OtpRejected));
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    assert!(controller.active_session().await.is_none());
    assert!(keyring.events().is_empty());
}

#[tokio::test]
async fn ble_disconnect_during_awaiting_otp() {
    let (adapter, _keyring, controller) = ble_fixture();

    controller.connect_ble("AA:BB").await.unwrap();
    let session = controller.active_session().await.unwrap();
    let handle = match session {
        seedlink_session::ActiveSession::Ble { transport, .. } => transport,
        other => panic!("expected BLE session, got {other:?}"),
    };

    // Device drops mid-AwaitingOtp
    adapter.trigger_disconnect(&handle);

    let err = controller.submit_otp(OTP).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Ble(BleError::DeviceUnreachable)
    ));
    // Never left stuck in AwaitingOtp
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    assert!(controller.active_session().await.is_none());
}

#[tokio::test]
async fn ble_unsolicited_disconnect_locks_wallet() {
    let (adapter, keyring, controller) = ble_fixture();
    controller.complete_ble_flow("AA:BB", OTP).await.unwrap();

    let session = controller.active_session().await.unwrap();
    let handle = match session {
        seedlink_session::ActiveSession::Ble { transport, .. } => transport,
        other => panic!("expected BLE session, got {other:?}"),
    };

    let mut status_rx = controller.subscribe_status();
    adapter.trigger_disconnect(&handle);

    // The one-shot watch drives the lock-and-reset path
    tokio::time::timeout(Duration::from_millis(500), async {
        loop {
            status_rx.changed().await.unwrap();
            if *status_rx.borrow() == ConnectionStatus::Locked {
                break;
            }
        }
    })
    .await
    .expect("status must reach Locked");

    assert!(keyring.is_locked());
    assert!(controller.active_session().await.is_none());
}

#[tokio::test]
async fn ble_disabled_radio_reverts_discovery_status() {
    let (adapter, _keyring, controller) = ble_fixture();
    adapter.fail_next_scan(BleError::BluetoothDisabled);

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = controller.begin_discovery(tx).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Ble(BleError::BluetoothDisabled)
    ));
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn ble_resubmitted_otp_keeps_paired_session() {
    let (_adapter, keyring, controller) = ble_fixture();
    controller.complete_ble_flow("AA:BB", OTP).await.unwrap();

    // A stray second submission must not tear down the healthy link
    let err = controller.submit_otp(OTP).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Ble(BleError::OtpAlreadyConsumed)
    ));
    assert_eq!(controller.status(), ConnectionStatus::Connected);
    assert!(controller.active_session().await.is_some());
    assert_eq!(keyring.events().len(), 1);
}

#[tokio::test]
async fn ble_keyring_failure_tears_down() {
    let (_adapter, keyring, controller) = ble_fixture();
    keyring.fail_next(seedlink_session::KeyringError::HardwareRegistration(
        "vault locked".to_string(),
    ));

    controller.connect_ble("AA:BB").await.unwrap();
    let err = controller.submit_otp(OTP).await.unwrap_err();
    assert!(matches!(err, SessionError::Keyring(_)));
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    assert!(controller.active_session().await.is_none());
}

// ── NFC derivation ───────────────────────────────────────────────────

#[tokio::test]
async fn nfc_flow_derives_12_word_mnemonic() {
    let (reader, keyring, controller) = nfc_fixture(seed_card());

    let mnemonic = controller.complete_nfc_flow(&card_key()).await.unwrap();
    assert_eq!(mnemonic.word_count(), 12);
    assert_eq!(controller.status(), ConnectionStatus::Connected);

    // Session is single-shot: torn down immediately, reader released
    assert!(controller.active_session().await.is_none());
    assert_eq!(reader.release_count(), 1);
    assert_eq!(keyring.events(), vec![KeyringEvent::MnemonicWallet { word_count: 12 }]);
}

#[tokio::test]
async fn nfc_flow_is_deterministic() {
    let expected = seedlink_codec::entropy_to_mnemonic(&ENTROPY).unwrap();

    for _ in 0..3 {
        let (_reader, _keyring, controller) = nfc_fixture(seed_card());
        let mnemonic = controller.complete_nfc_flow(&card_key()).await.unwrap();
        assert_eq!(mnemonic, expected);
    }
}

#[tokio::test]
async fn nfc_wrong_key_is_recoverable() {
    let (reader, keyring, controller) = nfc_fixture(seed_card());

    let wrong = SectorKey::new([0u8; 6]);
    let err = controller.complete_nfc_flow(&wrong).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Nfc(NfcError::AuthenticationRejected { sector: 1 })
    ));
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    // Reader released despite the failure...
    assert_eq!(reader.release_count(), 1);
    assert!(keyring.events().is_empty());

    // ...so re-entry with the right key succeeds without an app restart
    let mnemonic = controller.complete_nfc_flow(&card_key()).await.unwrap();
    assert_eq!(mnemonic.word_count(), 12);
}

#[tokio::test]
async fn nfc_no_tag_times_out_and_releases() {
    let (_reader, _keyring, controller) = nfc_fixture(MockTagReader::empty_field());

    let err = controller.complete_nfc_flow(&card_key()).await.unwrap_err();
    assert!(matches!(err, SessionError::Nfc(NfcError::NoTagDetected)));
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);

    // The transport is free for the next attempt
    let err = controller.complete_nfc_flow(&card_key()).await.unwrap_err();
    assert!(matches!(err, SessionError::Nfc(NfcError::NoTagDetected)));
}

#[tokio::test]
async fn nfc_stalled_read_torn_down_by_timeout() {
    let mut card = seed_card();
    card.hang_read(6);
    let (reader, keyring, controller) = nfc_fixture(card);

    let err = controller.complete_nfc_flow(&card_key()).await.unwrap_err();
    assert!(matches!(err, SessionError::Nfc(NfcError::IoTimeout)));
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);

    // The stall must not wedge the reader
    assert_eq!(reader.release_count(), 1);
    assert!(controller.active_session().await.is_none());
    assert!(keyring.events().is_empty());
}

#[tokio::test]
async fn nfc_io_failure_closes_session() {
    let mut card = seed_card();
    card.fail_read(6, NfcError::IoRejected);
    let (reader, keyring, controller) = nfc_fixture(card);

    let err = controller.complete_nfc_flow(&card_key()).await.unwrap_err();
    assert!(matches!(err, SessionError::Nfc(NfcError::IoRejected)));
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    assert_eq!(reader.release_count(), 1);
    assert!(keyring.events().is_empty());
}

// ── Exclusive-session policy ─────────────────────────────────────────

#[tokio::test]
async fn only_one_session_kind_at_a_time() {
    let adapter = Arc::new(MockAdapter::new(OTP));
    adapter.set_reachable("AA:BB", true);
    let keyring = Arc::new(MockKeyring::new());
    let controller = Arc::new(SessionController::new(
        Arc::clone(&adapter) as _,
        Arc::new(seed_card()),
        Arc::clone(&keyring) as _,
        SessionConfig::for_testing(),
    ));

    controller.complete_ble_flow("AA:BB", OTP).await.unwrap();

    // BLE session active: the NFC flow must be refused
    let err = controller.complete_nfc_flow(&card_key()).await.unwrap_err();
    assert!(matches!(err, SessionError::SessionAlreadyActive));

    // reload() clears the way
    controller.reload().await;
    assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    let mnemonic = controller.complete_nfc_flow(&card_key()).await.unwrap();
    assert_eq!(mnemonic.word_count(), 12);
}
