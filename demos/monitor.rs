//! Store discovery and change monitoring walkthrough
//!
//! Run with: cargo run --example monitor

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use keyhaven_core::{
    Certificate, CredentialObject, FileCacheProvider, KeyStoreManager, ManagerConfig,
    MemoryProvider, StoreDescriptor, StoreKind, StoreProvider,
};
use tracing_subscriber::EnvFilter;

fn demo_certificate(subject: &str, issuer: &str) -> Certificate {
    let now = Utc::now();
    Certificate::new(
        subject,
        issuer,
        now - ChronoDuration::days(1),
        now + ChronoDuration::days(365),
        format!("{}|{}", subject, issuer).into_bytes(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Store Monitor Demo ===\n");

    // Step 1: set up providers - an in-memory backend playing the role of
    // the OS, and the persistent application certificate cache
    println!("1. Starting providers...");
    let devices = Arc::new(MemoryProvider::new());
    devices.add_store(StoreDescriptor {
        id: "system:0".to_string(),
        name: "System Trust".to_string(),
        kind: StoreKind::SystemTrust,
        read_only: true,
    });
    devices.insert_entry(
        "system:0",
        CredentialObject::Certificate(demo_certificate("CN=Demo Root CA", "CN=Demo Root CA")),
    );

    let cache_dir = tempfile::TempDir::new()?;
    let cache = Arc::new(FileCacheProvider::with_dir(cache_dir.path().to_path_buf())?);

    let manager = KeyStoreManager::with_config(
        vec![devices.clone() as Arc<dyn StoreProvider>, cache],
        ManagerConfig {
            poll_interval: Duration::from_millis(250),
            ..Default::default()
        },
    );
    let mut manager_events = manager.subscribe();
    manager.scan().await;
    println!("   ✓ Manager running\n");

    // Step 2: look at what discovery found
    println!("2. Discovered {} stores:", manager.count());
    for store in manager.key_stores() {
        println!(
            "   - [{}] {} (kind: {}, read-only: {})",
            store.id(),
            store.name(),
            store.kind(),
            store.is_read_only()
        );
    }
    while let Ok(event) = manager_events.try_recv() {
        println!("   event: {:?}", event);
    }
    println!();

    // Step 3: the system trust store is read-only
    println!("3. Reading the system trust store:");
    let system = manager.key_store("system:0").unwrap();
    for entry in system.entry_list().await {
        println!("   - {} ({})", entry.name(), entry.kind().unwrap());
    }
    let refused = !system
        .write_certificate(&demo_certificate("CN=intruder", "CN=intruder"))
        .await;
    println!("   ✓ Write refused by read-only store: {}\n", refused);

    // Step 4: cache a certificate and watch the Updated event
    println!("4. Caching a certificate:");
    let app = manager.key_store("application:0").unwrap();
    let mut app_events = app.subscribe();

    let accepted = app
        .write_certificate(&demo_certificate("CN=service.internal", "CN=Demo Root CA"))
        .await;
    println!("   ✓ Write accepted: {}", accepted);
    println!("   event: {:?}", app_events.try_recv()?);
    for entry in app.entry_list().await {
        let fingerprint = entry.certificate().map(|c| c.fingerprint()).unwrap_or_default();
        println!("   - {} ({}...)", entry.name(), &fingerprint[..16]);
    }
    println!();

    // Step 5: a smart card shows up at runtime - the push channel gets it
    // into the registry without waiting for the next poll
    println!("5. Inserting a smart card...");
    devices.add_store(StoreDescriptor {
        id: "card:0".to_string(),
        name: "Demo Smart Card".to_string(),
        kind: StoreKind::SmartCard,
        read_only: false,
    });
    let appeared = tokio::time::timeout(Duration::from_secs(2), manager_events.recv()).await??;
    println!("   ✓ Manager announced: {:?}\n", appeared);

    // Step 6: pull the card again
    println!("6. Pulling the card...");
    let card = manager.key_store("card:0").unwrap();
    let mut card_events = card.subscribe();
    devices.remove_store("card:0");

    let gone = tokio::time::timeout(Duration::from_secs(2), card_events.recv()).await??;
    println!("   ✓ Store reported: {:?}", gone);
    println!("   ✓ Still available: {}", card.is_available());
    println!(
        "   ✓ Registry lookup now: {:?}",
        manager.key_store("card:0").map(|s| s.id().to_string())
    );
    println!("   ✓ Stale handle entry_list() length: {}\n", card.entry_list().await.len());

    // Step 7: accumulated diagnostics, if any backend misbehaved
    println!("7. Diagnostics:");
    let text = manager.diagnostic_text();
    if text.is_empty() {
        println!("   (none)");
    } else {
        print!("{}", text);
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
