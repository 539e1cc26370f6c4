//! Minimal example: a document vault over a directory bucket.
//!
//! Stores a document under a retention hold, reads it back, rotates the key
//! ring and shows the old document is still readable, then releases the hold
//! and deletes it. The audit log is written next to the bucket.
//!
//! Run with: `RUST_LOG=docvault=debug cargo run --example document_vault_demo`

use std::collections::HashMap;

use docvault::{
    generate_passphrase, CryptoEngine, Document, DocumentVault, FileAuditSink, FileSystemBucket,
    KeyIdentifier, KeyRing, Owner, VaultError,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Setup: a bucket directory and a first key.
    let workdir = tempfile::tempdir()?;
    let bucket_path = workdir.path().join("bucket");
    std::fs::create_dir(&bucket_path)?;
    let audit_path = workdir.path().join("audit.jsonl");

    let first = KeyIdentifier::new(1)?;
    let second = KeyIdentifier::new(2)?;
    let first_passphrase = generate_passphrase()?;
    let second_passphrase = generate_passphrase()?;

    let mut vault = DocumentVault::new(
        CryptoEngine::new(KeyRing::new(
            first,
            first_passphrase.clone(),
            HashMap::from([(first, first_passphrase.clone())]),
        )?),
        FileSystemBucket::open(&bucket_path).await?,
    );
    vault.add_audit_sink(Box::new(FileAuditSink::new(&audit_path)?));

    // 2. Store a document for an owner, under retention hold.
    let owner = Owner::new("12345678901");
    let document = Document::new("Tittel1", "application/pdf", b"%PDF-1.7 ...".to_vec());
    let id = vault.store(&owner, &document, true).await?;
    println!("Stored document {id}");

    let read = vault.retrieve(&id, &owner).await?;
    assert_eq!(read.as_ref(), Some(&document));
    assert!(vault.retrieve(&id, &Owner::new("99999")).await?.is_none());
    println!("Owner can read it, nobody else can");

    // 3. Rotate: key 2 becomes active, key 1 stays for decryption.
    let mut vault = DocumentVault::new(
        CryptoEngine::new(KeyRing::new(
            second,
            second_passphrase.clone(),
            HashMap::from([(first, first_passphrase), (second, second_passphrase)]),
        )?),
        FileSystemBucket::open(&bucket_path).await?,
    );
    vault.add_audit_sink(Box::new(FileAuditSink::new(&audit_path)?));

    assert_eq!(vault.retrieve(&id, &owner).await?, Some(document));
    println!("Document still readable after rotating to key {second}");

    // 4. Retention hold blocks deletion until cleared.
    match vault.delete(&id, &owner).await {
        Err(VaultError::HoldViolation) => println!("Delete refused: document is on hold"),
        other => println!("Unexpected delete result: {other:?}"),
    }
    vault.clear_hold(&id, &owner).await?;
    let deleted = vault.delete(&id, &owner).await?;
    println!("Hold cleared, deleted: {deleted}");

    // 5. Audit log
    let audit = std::fs::read_to_string(&audit_path)?;
    println!("Audit log: {} record(s)", audit.lines().count());
    for line in audit.lines() {
        println!("  {line}");
    }

    Ok(())
}
