//! Published locations are immutable: identical re-uploads are no-ops,
//! differing ones fail with `Conflict`, write nothing, and leave the
//! original intact.

use std::path::Path;

use relkit_core::{sha256_digest, Category, ErrorKind, Revision};
use relkit_crypto::{KeyProvider, LocalKeyProvider, VerifyingKey};
use relkit_pipeline::{
    sign_manifest, LocalArtifactSet, PublishRequest, Publisher, SignatureFile, SignatureMode,
};
use relkit_store::{FsObjectStore, MemoryObjectStore, ObjectStore};

fn signer() -> LocalKeyProvider {
    LocalKeyProvider::from_seed(&[5u8; 32])
}

fn signed_set(dir: &Path, files: &[(&str, &[u8])]) -> (LocalArtifactSet, Vec<SignatureFile>) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, bytes) in files {
        std::fs::write(dir.join(name), bytes).unwrap();
    }
    let set = LocalArtifactSet::scan(dir).unwrap();
    let sigs = sign_manifest(&signer(), set.manifest(), SignatureMode::Manifest).unwrap();
    (set, sigs)
}

fn request<'a>(
    set: &'a LocalArtifactSet,
    sigs: &'a [SignatureFile],
    key: &'a VerifyingKey,
) -> PublishRequest<'a> {
    PublishRequest {
        category: Category::release(),
        revision: Revision::new("abc123").unwrap(),
        set,
        signatures: sigs,
        verifying_key: key,
    }
}

fn check_backend(store: &dyn ObjectStore, dir: &Path) {
    let key = signer().verifying_key().unwrap();
    let (set, sigs) = signed_set(&dir.join("first"), &[("replica", &b"A"[..])]);
    let publisher = Publisher::new(store);

    let first = publisher.publish(&request(&set, &sigs, &key), None).unwrap();
    assert_eq!(first.created, 3);
    let second = publisher.publish(&request(&set, &sigs, &key), None).unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.already_present, 3);
    let published = store.list("release/abc123/").unwrap();

    let (other, other_sigs) = signed_set(&dir.join("second"), &[("replica", &b"B"[..])]);
    let err = publisher
        .publish(&request(&other, &other_sigs, &key), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.kind().exit_code(), 3);

    // A wider set under the same revision leaves no orphan behind.
    let (wider, wider_sigs) = signed_set(
        &dir.join("third"),
        &[("replica", &b"A"[..]), ("nodemanager", &b"N"[..])],
    );
    let err = publisher
        .publish(&request(&wider, &wider_sigs, &key), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(store.list("release/abc123/").unwrap(), published);

    let stored = store.get("release/abc123/replica").unwrap().unwrap();
    assert_eq!(stored, b"A");
    let sums = store.get("release/abc123/SHA256SUMS").unwrap().unwrap();
    assert!(String::from_utf8(sums)
        .unwrap()
        .starts_with(&sha256_digest(b"A").to_hex()));
}

#[test]
fn filesystem_store_is_immutable() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path().join("store"));
    check_backend(&store, dir.path());
}

#[test]
fn memory_store_is_immutable() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryObjectStore::new();
    check_backend(&store, dir.path());
}

#[test]
fn concurrent_identical_publishes_both_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path().join("store"));
    let (set, sigs) = signed_set(&dir.path().join("set"), &[("replica", &b"A"[..])]);
    let key = signer().verifying_key().unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| Publisher::new(&store).publish(&request(&set, &sigs, &key), None)))
            .collect();
        let mut created = 0;
        for h in handles {
            created += h.join().unwrap().unwrap().created;
        }
        assert_eq!(created, 3);
    });
}
