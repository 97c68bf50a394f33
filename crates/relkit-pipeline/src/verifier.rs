//! # Determinism Verifier
//!
//! Compares the hash manifests of two independent builds (variants) of
//! the same revision and category. Any missing artifact, extra artifact or
//! digest difference is a mismatch. The diff is labelled by variant. Whether a mismatch blocks the pipeline is
//! the caller's policy; this module only reports.

use relkit_core::{
    ArtifactName, BuildVariant, Category, ContentDigest, HashManifest, PipelineError, Revision,
    MANIFEST_FILE_NAME,
};
use serde::Serialize;

/// One build's manifest and the variant that produced it.
#[derive(Debug, Clone, Copy)]
pub struct BuildManifest<'a> {
    pub variant: &'a BuildVariant,
    pub manifest: &'a HashManifest,
}

impl<'a> BuildManifest<'a> {
    pub fn new(variant: &'a BuildVariant, manifest: &'a HashManifest) -> Self {
        Self { variant, manifest }
    }

    fn label(&self) -> String {
        format!("{}/{MANIFEST_FILE_NAME}", self.variant)
    }
}

/// One artifact whose digest differs between the two builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestMismatch {
    pub name: ArtifactName,
    pub left: ContentDigest,
    pub right: ContentDigest,
}

/// Outcome of comparing two manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub revision: Revision,
    pub category: Category,
    pub left_variant: BuildVariant,
    pub right_variant: BuildVariant,
    /// Present in the left build only.
    pub missing: Vec<ArtifactName>,
    /// Present in the right build only.
    pub extra: Vec<ArtifactName>,
    pub mismatched: Vec<DigestMismatch>,
    /// Unified-style diff of the two rendered manifests.
    pub diff: String,
}

impl VerificationReport {
    /// Whether both builds agree on every artifact.
    pub fn is_match(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.mismatched.is_empty()
    }

    /// Every name involved in a mismatch, sorted.
    pub fn mismatched_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .missing
            .iter()
            .chain(self.extra.iter())
            .chain(self.mismatched.iter().map(|m| &m.name))
            .map(|n| n.to_string())
            .collect();
        names.sort();
        names
    }

    /// The blocking form of this report.
    pub fn to_error(&self) -> PipelineError {
        PipelineError::DeterminismMismatch {
            revision: self.revision.clone(),
            category: self.category.clone(),
            mismatched: self.mismatched_names(),
        }
    }
}

/// Compare two builds of the same revision and category.
pub fn verify_manifests(
    revision: &Revision,
    category: &Category,
    left_build: BuildManifest<'_>,
    right_build: BuildManifest<'_>,
) -> VerificationReport {
    let (left, right) = (left_build.manifest, right_build.manifest);
    let mut missing = Vec::new();
    let mut extra = Vec::new();
    let mut mismatched = Vec::new();

    for (name, l) in left.iter() {
        match right.get(name) {
            None => missing.push(name.clone()),
            Some(r) if r != l => mismatched.push(DigestMismatch {
                name: name.clone(),
                left: *l,
                right: *r,
            }),
            Some(_) => {}
        }
    }
    for name in right.names() {
        if !left.contains(name) {
            extra.push(name.clone());
        }
    }

    let report = VerificationReport {
        revision: revision.clone(),
        category: category.clone(),
        left_variant: left_build.variant.clone(),
        right_variant: right_build.variant.clone(),
        missing,
        extra,
        mismatched,
        diff: unified_diff(&left_build.label(), left, &right_build.label(), right),
    };
    if report.is_match() {
        tracing::info!(
            %revision,
            %category,
            left = %left_build.variant,
            right = %right_build.variant,
            artifacts = left.len(),
            "builds are deterministic"
        );
    } else {
        tracing::warn!(
            %revision,
            %category,
            left = %left_build.variant,
            right = %right_build.variant,
            mismatched = ?report.mismatched_names(),
            "determinism mismatch between builds"
        );
    }
    report
}

/// Render a single-hunk unified diff of two manifests.
///
/// Both manifests are sorted by name, so a merge walk pairs entries
/// without a general diff algorithm.
pub fn unified_diff(
    left_label: &str,
    left: &HashManifest,
    right_label: &str,
    right: &HashManifest,
) -> String {
    let line = |name: &ArtifactName, d: &ContentDigest| format!("{}  {}", d.to_hex(), name);
    let mut body = Vec::new();
    let mut l = left.iter().peekable();
    let mut r = right.iter().peekable();
    loop {
        match (l.peek(), r.peek()) {
            (None, None) => break,
            (Some((ln, ld)), None) => {
                body.push(format!("-{}", line(ln, ld)));
                l.next();
            }
            (None, Some((rn, rd))) => {
                body.push(format!("+{}", line(rn, rd)));
                r.next();
            }
            (Some((ln, ld)), Some((rn, rd))) => match ln.cmp(rn) {
                std::cmp::Ordering::Less => {
                    body.push(format!("-{}", line(ln, ld)));
                    l.next();
                }
                std::cmp::Ordering::Greater => {
                    body.push(format!("+{}", line(rn, rd)));
                    r.next();
                }
                std::cmp::Ordering::Equal => {
                    if ld == rd {
                        body.push(format!(" {}", line(ln, ld)));
                    } else {
                        body.push(format!("-{}", line(ln, ld)));
                        body.push(format!("+{}", line(rn, rd)));
                    }
                    l.next();
                    r.next();
                }
            },
        }
    }
    let mut out = format!(
        "--- {left_label}\n+++ {right_label}\n@@ -1,{} +1,{} @@\n",
        left.len(),
        right.len()
    );
    for b in body {
        out.push_str(&b);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use relkit_core::{sha256_digest, ErrorKind};

    fn name(s: &str) -> ArtifactName {
        ArtifactName::new(s).unwrap()
    }

    fn rev() -> Revision {
        Revision::new("abc123").unwrap()
    }

    fn manifest(entries: &[(&str, &str)]) -> HashManifest {
        entries
            .iter()
            .map(|(n, c)| (name(n), sha256_digest(c.as_bytes())))
            .collect()
    }

    fn compare(
        category: &Category,
        left: &HashManifest,
        right: &HashManifest,
    ) -> VerificationReport {
        verify_manifests(
            &rev(),
            category,
            BuildManifest::new(&BuildVariant::native(), left),
            BuildManifest::new(&BuildVariant::container(), right),
        )
    }

    #[test]
    fn identical_manifests_match() {
        let m = manifest(&[("replica", "r"), ("nodemanager", "n")]);
        let report = compare(&Category::release(), &m, &m.clone());
        assert!(report.is_match());
        assert!(report.mismatched_names().is_empty());
        assert!(!report.diff.lines().any(|l| l.starts_with('-') && !l.starts_with("---")));
    }

    #[test]
    fn single_digest_difference_is_reported() {
        let a = manifest(&[("replica", "r1"), ("nodemanager", "n")]);
        let b = manifest(&[("replica", "r2"), ("nodemanager", "n")]);
        let report = compare(&Category::release(), &a, &b);
        assert!(!report.is_match());
        assert_eq!(report.mismatched_names(), vec!["replica"]);
        assert_eq!(report.mismatched[0].left, sha256_digest(b"r1"));
        assert_eq!(report.mismatched[0].right, sha256_digest(b"r2"));
        assert!(report.diff.contains(&format!("-{}  replica", sha256_digest(b"r1"))));
        assert!(report.diff.contains(&format!("+{}  replica", sha256_digest(b"r2"))));
    }

    #[test]
    fn missing_and_extra_are_reported() {
        let a = manifest(&[("replica", "r"), ("canister.wasm", "c")]);
        let b = manifest(&[("replica", "r"), ("orchestrator", "o")]);
        let report = compare(&Category::release(), &a, &b);
        assert_eq!(report.missing, vec![name("canister.wasm")]);
        assert_eq!(report.extra, vec![name("orchestrator")]);
        assert!(report.mismatched.is_empty());
        assert_eq!(report.mismatched_names(), vec!["canister.wasm", "orchestrator"]);
    }

    #[test]
    fn blocking_error_carries_context() {
        let a = manifest(&[("replica", "r1")]);
        let b = manifest(&[("replica", "r2")]);
        let err = compare(&Category::guest_os(), &a, &b).to_error();
        assert_eq!(err.kind(), ErrorKind::DeterminismMismatch);
        let msg = err.to_string();
        assert!(msg.contains("guest-os/abc123"));
        assert!(msg.contains("replica"));
    }

    #[test]
    fn diff_is_labelled_by_variant() {
        let a = manifest(&[("replica", "r1")]);
        let b = manifest(&[("replica", "r2")]);
        let dev = BuildVariant::new("dev-native").unwrap();
        let report = verify_manifests(
            &rev(),
            &Category::release(),
            BuildManifest::new(&dev, &a),
            BuildManifest::new(&BuildVariant::container(), &b),
        );
        assert_eq!(report.left_variant, dev);
        assert_eq!(report.right_variant, BuildVariant::container());
        let mut lines = report.diff.lines();
        assert_eq!(lines.next(), Some("--- dev-native/SHA256SUMS"));
        assert_eq!(lines.next(), Some("+++ container/SHA256SUMS"));
    }

    #[test]
    fn diff_header_and_context() {
        let a = manifest(&[("a", "1"), ("b", "2")]);
        let diff = unified_diff("x", &a, "y", &a);
        let lines: Vec<&str> = diff.lines().collect();
        assert_eq!(lines[0], "--- x");
        assert_eq!(lines[1], "+++ y");
        assert_eq!(lines[2], "@@ -1,2 +1,2 @@");
        assert!(lines[3].starts_with(' '));
        assert_eq!(lines.len(), 5);
    }

    proptest! {
        #[test]
        fn exactly_the_altered_artifact_is_reported(
            names in proptest::collection::btree_set("[a-z][a-z0-9-]{0,10}", 1..10),
            pick in any::<proptest::sample::Index>(),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let left: HashManifest = names
                .iter()
                .map(|n| (name(n), sha256_digest(n.as_bytes())))
                .collect();
            let victim = &names[pick.index(names.len())];
            let mut right = left.clone();
            right.insert(name(victim), sha256_digest(b"\x00tampered")).unwrap();

            let same = compare(&Category::release(), &left, &left);
            prop_assert!(same.is_match());

            let report = compare(&Category::release(), &left, &right);
            prop_assert_eq!(report.mismatched_names(), vec![victim.clone()]);
            prop_assert!(report.missing.is_empty());
            prop_assert!(report.extra.is_empty());
        }
    }
}
