//! End-to-end release scenarios over a filesystem store.
//!
//! 1. Two identical builds of `abc123` verify, get signed, land at
//!    `release/abc123/*`, and move `main` to `abc123`. A consumer then
//!    fetches the set back and checks its signature.
//! 2. Two builds that differ in `replica` stop before publishing: the
//!    store stays empty and the marker does not move.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relkit_core::{Branch, BuildVariant, Category, ErrorKind, MarkerTag, Revision};
use relkit_crypto::{KeyProvider, LocalKeyProvider};
use relkit_pipeline::{
    describe_release, run_release, verify_directory, FetchRequest, Fetcher, LinearHistory,
    PipelineConfig, PromotionStatus, PromotionTracker, ReleaseContext, ReleaseInputs,
    ReleaseStatus, SignatureMode, UpgradeContent,
};
use relkit_store::{FsObjectStore, ObjectStore};

fn write_build(dir: &Path, replica: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("replica"), replica).unwrap();
    std::fs::write(dir.join("nodemanager"), b"nodemanager-bytes").unwrap();
}

fn inputs(a: PathBuf, b: PathBuf) -> ReleaseInputs {
    ReleaseInputs {
        category: Category::release(),
        revision: Revision::new("abc123").unwrap(),
        primary: a,
        primary_variant: BuildVariant::native(),
        secondary: b,
        secondary_variant: BuildVariant::container(),
        branch: Some(Branch::new("main").unwrap()),
        tag: None,
        signature_mode: SignatureMode::Manifest,
    }
}

fn main_marker(store: &dyn ObjectStore) -> Option<Revision> {
    PromotionTracker::new(store)
        .get(&Branch::new("main").unwrap(), &MarkerTag::default())
        .unwrap()
}

#[tokio::test]
async fn identical_builds_are_published_promoted_and_fetchable() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (dir.path().join("build-a"), dir.path().join("build-b"));
    write_build(&a, b"replica-bytes");
    write_build(&b, b"replica-bytes");

    let store = Arc::new(FsObjectStore::new(dir.path().join("store")));
    let keys = LocalKeyProvider::from_seed(&[11u8; 32]);
    let history = LinearHistory::parse("abc123\n").unwrap();
    let ctx = ReleaseContext {
        store: store.as_ref(),
        keys: &keys,
        oracle: &history,
    };

    let report = run_release(&PipelineConfig::default(), &ctx, &inputs(a, b)).unwrap();
    assert_eq!(report.status, ReleaseStatus::Published);
    assert!(report.verification.is_match());
    assert_eq!(report.promotion, PromotionStatus::Created);
    let published = report.published.unwrap();
    assert_eq!(
        published.locations,
        vec![
            "release/abc123/nodemanager",
            "release/abc123/replica",
            "release/abc123/SHA256SUMS.sig",
            "release/abc123/SHA256SUMS",
        ]
    );
    assert_eq!(main_marker(store.as_ref()).unwrap().as_str(), "abc123");

    let out = dir.path().join("fetched");
    let fetched = Fetcher::new(store.clone())
        .fetch(&FetchRequest {
            category: Category::release(),
            revision: Revision::new("abc123").unwrap(),
            include: Vec::new(),
            out_dir: out.clone(),
            concurrency: 2,
        })
        .await
        .unwrap();
    assert_eq!(fetched.files.len(), 2);
    assert_eq!(std::fs::read(out.join("replica")).unwrap(), b"replica-bytes");
    let mode = verify_directory(&out, &keys.verifying_key().unwrap()).unwrap();
    assert_eq!(mode, SignatureMode::Manifest);

    let descriptor = describe_release(
        store.as_ref(),
        &url::Url::parse("https://download.example.org/ic").unwrap(),
        &Revision::new("abc123").unwrap(),
        UpgradeContent::All,
    )
    .unwrap();
    assert_eq!(
        descriptor.replica.unwrap().url.as_str(),
        "https://download.example.org/ic/release/abc123/replica"
    );
    assert!(descriptor.release_package.is_none());
}

#[test]
fn differing_replica_skips_publish_and_keeps_marker() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (dir.path().join("build-a"), dir.path().join("build-b"));
    write_build(&a, b"replica-bytes");
    write_build(&b, b"replica-bytes-but-different");

    let store = FsObjectStore::new(dir.path().join("store"));
    let keys = LocalKeyProvider::from_seed(&[11u8; 32]);
    let history = LinearHistory::parse("abc123\n").unwrap();
    let ctx = ReleaseContext {
        store: &store,
        keys: &keys,
        oracle: &history,
    };

    let report = run_release(&PipelineConfig::default(), &ctx, &inputs(a.clone(), b.clone())).unwrap();
    assert_eq!(report.status, ReleaseStatus::MismatchNonBlocking);
    assert_eq!(report.verification.mismatched_names(), vec!["replica"]);
    assert!(report.published.is_none());
    assert!(store.list("").unwrap().is_empty());
    assert!(main_marker(&store).is_none());

    let blocking = PipelineConfig {
        block_on_mismatch: true,
        ..PipelineConfig::default()
    };
    let err = run_release(&blocking, &ctx, &inputs(a, b)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeterminismMismatch);
    assert_eq!(err.kind().exit_code(), 6);
    assert!(store.list("").unwrap().is_empty());
}

#[test]
fn rerunning_a_release_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (dir.path().join("build-a"), dir.path().join("build-b"));
    write_build(&a, b"replica-bytes");
    write_build(&b, b"replica-bytes");

    let store = FsObjectStore::new(dir.path().join("store"));
    let keys = LocalKeyProvider::from_seed(&[11u8; 32]);
    let history = LinearHistory::parse("abc123\n").unwrap();
    let ctx = ReleaseContext {
        store: &store,
        keys: &keys,
        oracle: &history,
    };
    run_release(&PipelineConfig::default(), &ctx, &inputs(a.clone(), b.clone())).unwrap();
    let again = run_release(&PipelineConfig::default(), &ctx, &inputs(a, b)).unwrap();
    let published = again.published.unwrap();
    assert_eq!(published.created, 0);
    assert_eq!(published.already_present, 4);
    assert_eq!(again.promotion, PromotionStatus::Unchanged);
}
