//! Passphrase unlock handshake walkthrough
//!
//! Run with: cargo run --example passphrase

use std::sync::Arc;
use std::time::Duration;

use keyhaven_core::{
    CredentialObject, KeyStoreManager, ManagerConfig, MemoryProvider, Passphrase, PgpKey,
    SecretMaterial, StoreDescriptor, StoreEvent, StoreKind, StoreProvider,
};
use tracing_subscriber::EnvFilter;

async fn next_event(
    events: &mut tokio::sync::broadcast::Receiver<StoreEvent>,
) -> anyhow::Result<StoreEvent> {
    Ok(tokio::time::timeout(Duration::from_secs(2), events.recv()).await??)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Passphrase Demo ===\n");

    // Step 1: a PGP keyring that wants a passphrase, with a key already
    // in it, and a PIN-protected card that allows a single attempt
    println!("1. Setting up locked stores...");
    let devices = Arc::new(MemoryProvider::new());
    devices.add_locked_store(
        StoreDescriptor {
            id: "ring:0".to_string(),
            name: "Demo Keyring".to_string(),
            kind: StoreKind::PgpKeyring,
            read_only: false,
        },
        "correct horse",
        3,
    );
    devices.insert_entry(
        "ring:0",
        CredentialObject::PgpSecret(PgpKey::secret(
            "89ABCDEF01234567",
            "Demo User <demo@example.org>",
            vec![0x99, 0x01],
            SecretMaterial::new(vec![0x95; 16]),
        )),
    );
    devices.add_locked_store(
        StoreDescriptor {
            id: "card:0".to_string(),
            name: "PIN Card".to_string(),
            kind: StoreKind::SmartCard,
            read_only: false,
        },
        "0000",
        1,
    );

    let manager = KeyStoreManager::with_config(
        vec![devices.clone() as Arc<dyn StoreProvider>],
        ManagerConfig {
            poll_interval: Duration::from_millis(250),
            ..Default::default()
        },
    );
    manager.scan().await;
    println!("   ✓ {} stores discovered\n", manager.count());

    // Step 2: a locked store lists as empty and asks for a passphrase
    println!("2. Reading the locked keyring:");
    let ring = manager.key_store("ring:0").unwrap();
    let mut ring_events = ring.subscribe();

    let entries = ring.entry_list().await;
    println!("   ✓ Entries while locked: {}", entries.len());
    println!("   event: {:?}\n", next_event(&mut ring_events).await?);

    // Step 3: a wrong passphrase just asks again
    println!("3. Trying a wrong passphrase...");
    ring.submit_passphrase(Passphrase::from("tr0ub4dor")).await;
    println!("   event: {:?}\n", next_event(&mut ring_events).await?);

    // Step 4: the right passphrase unlocks and the contents appear
    println!("4. Trying the right passphrase...");
    ring.submit_passphrase(Passphrase::from("correct horse")).await;
    println!("   event: {:?}", next_event(&mut ring_events).await?);

    for entry in ring.entry_list().await {
        println!("   - {} [{}]", entry.name(), entry.kind().unwrap());
        if let Some(public) = entry.pgp_public_key() {
            println!("     public half: key id {}", public.key_id);
        }
    }
    println!();

    // Step 5: importing the public half again must not lose the secret
    println!("5. Re-importing the public half:");
    let refreshed = PgpKey::public(
        "89ABCDEF01234567",
        "Demo User <demo@example.org>",
        vec![0x99, 0x01, 0x02],
    );
    let merged = ring.write_pgp_key(&refreshed).await.unwrap();
    println!("   ✓ Stored key is still secret: {}\n", merged.is_secret());

    // Step 6: one wrong PIN locks the card out for good
    println!("6. Exhausting the card's PIN attempts...");
    let card = manager.key_store("card:0").unwrap();
    let mut card_events = card.subscribe();

    card.submit_passphrase(Passphrase::from("1234")).await;
    println!("   event: {:?}", next_event(&mut card_events).await?);
    println!("   ✓ Card available: {}", card.is_available());

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!(
        "   ✓ Registry lookup now: {:?}\n",
        manager.key_store("card:0").map(|s| s.id().to_string())
    );

    // Step 7: the lockout left a trace
    println!("7. Diagnostics:");
    print!("{}", manager.diagnostic_text());

    println!("\n=== Demo Complete ===");
    Ok(())
}
