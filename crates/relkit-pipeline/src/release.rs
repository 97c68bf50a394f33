//! # Release Driver
//!
//! Runs one revision through verify → sign → publish → promote.
//!
//! The only channel between stages is the object store. Ordering is the
//! enforcement: nothing is signed before the two builds agree, and the
//! marker moves only after the manifest is published.
//!
//! On a determinism mismatch the policy decides:
//!
//! - `block_on_mismatch = false`: the run ends failed-but-non-blocking.
//!   Nothing is signed or published and the marker is untouched. The
//!   report says so and the call returns `Ok`.
//! - `block_on_mismatch = true`: the call returns `DeterminismMismatch`.

use std::path::PathBuf;

use relkit_core::{Branch, BuildVariant, Category, MarkerTag, PipelineError, Revision};
use relkit_crypto::KeyProvider;
use relkit_store::ObjectStore;
use serde::Serialize;

use crate::ancestry::AncestryOracle;
use crate::artifact_set::{load_manifest, LocalArtifactSet};
use crate::config::PipelineConfig;
use crate::publisher::{PromotionRequest, PromotionStatus, PublishReport, PublishRequest, Publisher};
use crate::signer::{sign_manifest, SignatureMode};
use crate::stage::retry_transient;
use crate::verifier::{verify_manifests, BuildManifest, VerificationReport};

/// Collaborators a release run needs.
pub struct ReleaseContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub keys: &'a dyn KeyProvider,
    pub oracle: &'a dyn AncestryOracle,
}

/// One revision's builds and where to promote it.
#[derive(Debug, Clone)]
pub struct ReleaseInputs {
    pub category: Category,
    pub revision: Revision,
    /// Directory holding the build to publish.
    pub primary: PathBuf,
    pub primary_variant: BuildVariant,
    /// Independent build of the same revision: a directory or a
    /// `SHA256SUMS` file.
    pub secondary: PathBuf,
    pub secondary_variant: BuildVariant,
    pub branch: Option<Branch>,
    /// Defaults to the configured tag.
    pub tag: Option<MarkerTag>,
    pub signature_mode: SignatureMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Published,
    /// Builds disagreed and the policy does not block: nothing published.
    MismatchNonBlocking,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReport {
    pub category: Category,
    pub revision: Revision,
    pub status: ReleaseStatus,
    pub verification: VerificationReport,
    pub published: Option<PublishReport>,
    pub promotion: PromotionStatus,
}

/// Verify, sign, publish and promote `inputs.revision`.
pub fn run_release(
    config: &PipelineConfig,
    ctx: &ReleaseContext<'_>,
    inputs: &ReleaseInputs,
) -> Result<ReleaseReport, PipelineError> {
    let retries = config.stage_retries;
    let span = tracing::info_span!("release", category = %inputs.category, revision = %inputs.revision);
    let _enter = span.enter();

    let set = retry_transient(retries, "scan", || LocalArtifactSet::scan(&inputs.primary))?;
    let other = retry_transient(retries, "scan", || load_manifest(&inputs.secondary))?;
    let verification = verify_manifests(
        &inputs.revision,
        &inputs.category,
        BuildManifest::new(&inputs.primary_variant, set.manifest()),
        BuildManifest::new(&inputs.secondary_variant, &other),
    );

    if !verification.is_match() {
        if config.block_on_mismatch {
            return Err(verification.to_error());
        }
        tracing::warn!("skipping publish: builds are not deterministic");
        return Ok(ReleaseReport {
            category: inputs.category.clone(),
            revision: inputs.revision.clone(),
            status: ReleaseStatus::MismatchNonBlocking,
            verification,
            published: None,
            promotion: PromotionStatus::NotRequested,
        });
    }

    let signatures = sign_manifest(ctx.keys, set.manifest(), inputs.signature_mode)?;
    let verifying_key = ctx.keys.verifying_key()?;

    let request = PublishRequest {
        category: inputs.category.clone(),
        revision: inputs.revision.clone(),
        set: &set,
        signatures: &signatures,
        verifying_key: &verifying_key,
    };
    let promotion = inputs.branch.as_ref().map(|branch| PromotionRequest {
        branch: branch.clone(),
        tag: inputs.tag.clone().unwrap_or_else(|| config.default_tag.clone()),
        oracle: ctx.oracle,
    });
    let publisher = Publisher::new(ctx.store);
    let published = retry_transient(retries, "publish", || {
        publisher.publish(&request, promotion.as_ref())
    })?;

    Ok(ReleaseReport {
        category: inputs.category.clone(),
        revision: inputs.revision.clone(),
        status: ReleaseStatus::Published,
        verification,
        promotion: published.promotion.clone(),
        published: Some(published),
    })
}
