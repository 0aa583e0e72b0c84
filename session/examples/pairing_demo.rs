//! Example: both pairing flows end to end against scripted drivers

use std::sync::Arc;

use tokio::sync::mpsc;

use seedlink_ble::{DeviceDescriptor, DeviceEvent, MockAdapter, ScanEvent};
use seedlink_nfc::{KeyRole, MockTagReader, SectorKey};
use seedlink_session::{MockKeyring, SessionConfig, SessionController};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("=== Hardware Pairing Demo ===\n");

    // Scripted drivers: one reachable BLE device, one tag carrying entropy
    // in sector 1 (blocks 4 and 6) behind key B.
    let otp = std::env::args().nth(1).unwrap_or_else(|| "4296".to_string());
    let adapter = Arc::new(MockAdapter::new(&otp));
    adapter.set_reachable("AA:BB", true);
    adapter.script_scan(vec![ScanEvent::Found(DeviceDescriptor {
        id: "AA:BB".to_string(),
        name: Some("SecuX W20".to_string()),
        is_connectable: true,
    })]);

    let key = SectorKey::from_hex("ffffffffffff")?;
    let mut card = MockTagReader::with_tag(&[0x04, 0xa2, 0x2b, 0x19]);
    card.set_key(1, KeyRole::B, key.clone());
    card.set_block(4, *b"seed entropy A..");
    card.set_block(6, [0u8; 16]);

    let keyring = Arc::new(MockKeyring::new());
    let controller = Arc::new(SessionController::new(
        adapter,
        Arc::new(card),
        Arc::clone(&keyring) as _,
        SessionConfig::default(),
    ));

    // 1. Discover devices over BLE
    println!("1. Scanning for devices...");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let scan = controller.begin_discovery(events_tx).await?;
    if let Some(DeviceEvent::Added(device)) = events_rx.recv().await {
        println!(
            "   Found: {} ({})",
            device.name.as_deref().unwrap_or("?"),
            device.id
        );
    }
    controller.end_discovery(&scan);

    // 2. Connect and pair with the OTP
    println!("\n2. Connecting to AA:BB...");
    controller.connect_ble("AA:BB").await?;
    println!("   Awaiting OTP (accepted code: {otp})");

    println!("   Submitting wrong code '0000'...");
    let accepted = controller.submit_otp("0000").await?;
    println!("   Accepted: {accepted} (retry allowed)");

    println!("   Submitting '{otp}'...");
    let accepted = controller.submit_otp(&otp).await?;
    println!("   Accepted: {accepted}, status: {:?}", controller.status());

    // 3. Back to the entry point, then pair via the tag instead
    println!("\n3. Resetting and switching to the NFC flow...");
    controller.reload().await;

    let mnemonic = controller.complete_nfc_flow(&key).await?;
    println!(
        "   Derived a {}-word mnemonic from the tag, status: {:?}",
        mnemonic.word_count(),
        controller.status()
    );

    println!("\n4. Keyring events: {:?}", keyring.events());
    Ok(())
}
