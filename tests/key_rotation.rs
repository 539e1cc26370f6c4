use std::collections::HashMap;
use std::sync::Arc;

use docvault::{
    CryptoEngine, Document, DocumentVault, EncryptedBlob, InMemoryStorage, KeyIdentifier,
    KeyRing, Owner, Passphrase, Storage, VaultError,
};

const PASSPHRASES: [(u32, &str); 3] = [(1, "passord"), (2, "passord2"), (3, "passord3")];

fn id(n: u32) -> KeyIdentifier {
    KeyIdentifier::new(n).unwrap()
}

fn ring(active: u32, decryption: &[u32]) -> KeyRing {
    let passphrase = |n: u32| {
        let (_, p) = PASSPHRASES.iter().find(|(k, _)| *k == n).unwrap();
        Passphrase::from(*p)
    };
    let keys: HashMap<_, _> = decryption.iter().map(|n| (id(*n), passphrase(*n))).collect();
    KeyRing::new(id(active), passphrase(active), keys).unwrap()
}

fn vault(ring: KeyRing, storage: &Arc<InMemoryStorage>) -> DocumentVault<Arc<InMemoryStorage>> {
    DocumentVault::new(CryptoEngine::new(ring), Arc::clone(storage))
}

fn document() -> Document {
    Document::new("Tittel1", "text/plain", b"hello".to_vec())
}

#[tokio::test]
async fn test_documents_survive_rotation() {
    let storage = Arc::new(InMemoryStorage::new());
    let owner = Owner::new("12345");

    let before = vault(ring(1, &[1]), &storage);
    let id_a = before.store(&owner, &document(), false).await.unwrap();

    let after = vault(ring(2, &[1, 2]), &storage);
    assert_eq!(after.retrieve(&id_a, &owner).await.unwrap(), Some(document()));

    // New writes are tagged with the new active key.
    let id_b = after.store(&owner, &document(), false).await.unwrap();
    assert_eq!(id_b.key_identifier(), id(2));

    let key = after.storage_key(&id_b, &owner).unwrap();
    let bytes = after.storage().get(&key).await.unwrap().unwrap();
    let blob = EncryptedBlob::from_bytes(&bytes).unwrap();
    assert_eq!(blob.key_identifier, id(2));

    // Same object name as before the rotation.
    assert_eq!(
        before.storage_key(&id_a, &owner).unwrap(),
        after.storage_key(&id_a, &owner).unwrap()
    );
}

#[tokio::test]
async fn test_unknown_key_reports_key_not_found() {
    let storage = Arc::new(InMemoryStorage::new());
    let owner = Owner::new("12345");

    let newer = vault(ring(2, &[1, 2]), &storage);
    let id_b = newer.store(&owner, &document(), false).await.unwrap();

    let older = vault(ring(1, &[1]), &storage);
    assert!(matches!(
        older.retrieve(&id_b, &owner).await,
        Err(VaultError::KeyNotFound(k)) if k == id(2)
    ));
    assert!(matches!(
        older.delete(&id_b, &owner).await,
        Err(VaultError::KeyNotFound(_))
    ));

    // Nothing was touched.
    assert_eq!(newer.retrieve(&id_b, &owner).await.unwrap(), Some(document()));
}

#[tokio::test]
async fn test_retiring_a_key_makes_its_documents_unavailable() {
    let storage = Arc::new(InMemoryStorage::new());
    let owner = Owner::new("12345");

    let first = vault(ring(1, &[1]), &storage);
    let id_a = first.store(&owner, &document(), false).await.unwrap();

    let retired = vault(ring(3, &[2, 3]), &storage);
    assert!(matches!(
        retired.retrieve(&id_a, &owner).await,
        Err(VaultError::KeyNotFound(k)) if k == id(1)
    ));
}

#[tokio::test]
async fn test_hold_survives_rotation() {
    let storage = Arc::new(InMemoryStorage::new());
    let owner = Owner::new("12345");

    let before = vault(ring(1, &[1]), &storage);
    let id_a = before.store(&owner, &document(), true).await.unwrap();

    let after = vault(ring(2, &[1, 2]), &storage);
    assert!(after.has_hold(&id_a, &owner).await.unwrap());
    assert!(matches!(
        after.delete(&id_a, &owner).await,
        Err(VaultError::HoldViolation)
    ));
    assert!(after.clear_hold(&id_a, &owner).await.unwrap());
    assert!(after.delete(&id_a, &owner).await.unwrap());
    assert!(storage.is_empty());
}
