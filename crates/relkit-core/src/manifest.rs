//! # Hash Manifest — `SHA256SUMS` Text Format
//!
//! A [`HashManifest`] maps artifact names to their SHA-256 digests. Its
//! text form is the `sha256sum` output format, one entry per line:
//!
//! ```text
//! 2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae  disk-img.zip
//! fcde2b2edba56bf408601fb721fe9b5c338d10ee429ea04fae5511b68fbf8fb9  replica
//! ```
//!
//! ## Invariants
//!
//! - Entries are kept in a `BTreeMap`, so rendering is always sorted by
//!   file name and two equal manifests render to identical bytes.
//! - Output always uses the two-space separator. On input, the
//!   binary-mode form `<hash> *<name>` is also accepted.
//! - Reserved names (the manifest itself and `*.sig`) are never entries.
//!
//! The rendered text is the only input the signer accepts, via
//! [`CanonicalBytes`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::error::ValidationError;
use crate::identity::ArtifactName;

/// File name under which a manifest is stored next to its artifacts.
pub const MANIFEST_FILE_NAME: &str = "SHA256SUMS";

/// Suffix of detached signature files.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Bytes of a rendered manifest, the sole signing input.
///
/// The inner buffer is private and the only constructor is
/// [`HashManifest::canonical_bytes()`], so a signature can only ever be
/// produced over sorted, normalized manifest text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Access the bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the manifest was empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Mapping from artifact name to SHA-256 digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashManifest {
    entries: BTreeMap<ArtifactName, ContentDigest>,
}

impl HashManifest {
    /// An empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry, returning the previous digest.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ReservedArtifactName`] for the manifest
    /// file name or signature files.
    pub fn insert(
        &mut self,
        name: ArtifactName,
        digest: ContentDigest,
    ) -> Result<Option<ContentDigest>, ValidationError> {
        if name.is_reserved() {
            return Err(ValidationError::ReservedArtifactName(name.to_string()));
        }
        Ok(self.entries.insert(name, digest))
    }

    /// Digest recorded for `name`.
    pub fn get(&self, name: &ArtifactName) -> Option<&ContentDigest> {
        self.entries.get(name)
    }

    /// Whether `name` is an entry.
    pub fn contains(&self, name: &ArtifactName) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in file-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactName, &ContentDigest)> {
        self.entries.iter()
    }

    /// Names in file-name order.
    pub fn names(&self) -> impl Iterator<Item = &ArtifactName> {
        self.entries.keys()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&ArtifactName) -> bool) {
        self.entries.retain(|name, _| keep(name));
    }

    /// Render to `sha256sum` text: `<hex>  <name>\n` per entry, sorted.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 80);
        for (name, digest) in &self.entries {
            out.push_str(&digest.to_hex());
            out.push_str("  ");
            out.push_str(name.as_str());
            out.push('\n');
        }
        out
    }

    /// Rendered text as signing input.
    pub fn canonical_bytes(&self) -> CanonicalBytes {
        CanonicalBytes(self.render().into_bytes())
    }

    /// Parse `sha256sum` text.
    ///
    /// Blank lines are skipped. Each other line must be 64 hex chars, a
    /// separator (`"  "` or `" *"`), and a valid, non-reserved name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ManifestParse`] with the 1-based line
    /// number, or [`ValidationError::DuplicateManifestEntry`].
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let mut manifest = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let parse_err = |reason: String| ValidationError::ManifestParse {
                line: line_no,
                reason,
            };
            if line.len() < 67 || !line.is_char_boundary(64) {
                return Err(parse_err(format!("line too short: {line:?}")));
            }
            let (hash, rest) = line.split_at(64);
            let name = rest
                .strip_prefix("  ")
                .or_else(|| rest.strip_prefix(" *"))
                .ok_or_else(|| parse_err("expected two-space or \" *\" separator".to_string()))?;
            let digest = ContentDigest::from_hex(hash).map_err(|e| parse_err(e.to_string()))?;
            let name = ArtifactName::new(name).map_err(|e| parse_err(e.to_string()))?;
            if manifest.contains(&name) {
                return Err(ValidationError::DuplicateManifestEntry(name.to_string()));
            }
            manifest
                .insert(name, digest)
                .map_err(|e| parse_err(e.to_string()))?;
        }
        Ok(manifest)
    }
}

impl FromIterator<(ArtifactName, ContentDigest)> for HashManifest {
    /// Collect entries, silently dropping reserved names.
    fn from_iter<I: IntoIterator<Item = (ArtifactName, ContentDigest)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .filter(|(name, _)| !name.is_reserved())
            .collect();
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::sha256_digest;
    use proptest::prelude::*;

    fn name(s: &str) -> ArtifactName {
        ArtifactName::new(s).unwrap()
    }

    fn sample() -> HashManifest {
        let mut m = HashManifest::new();
        m.insert(name("replica"), sha256_digest(b"replica")).unwrap();
        m.insert(name("nodemanager"), sha256_digest(b"nm")).unwrap();
        m
    }

    #[test]
    fn render_is_sorted_with_two_spaces() {
        let text = sample().render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  nodemanager"));
        assert!(lines[1].ends_with("  replica"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn parse_render_roundtrip() {
        let m = sample();
        assert_eq!(HashManifest::parse(&m.render()).unwrap(), m);
    }

    #[test]
    fn parse_accepts_binary_mode_marker() {
        let d = sha256_digest(b"x");
        let text = format!("{} *replica\n", d.to_hex());
        let m = HashManifest::parse(&text).unwrap();
        assert_eq!(m.get(&name("replica")), Some(&d));
    }

    #[test]
    fn parse_skips_blank_lines_and_crlf() {
        let d = sha256_digest(b"x");
        let text = format!("\n{}  replica\r\n\n", d.to_hex());
        assert_eq!(HashManifest::parse(&text).unwrap().len(), 1);
    }

    #[test]
    fn parse_rejects_single_space() {
        let text = format!("{} replica\n", sha256_digest(b"x").to_hex());
        let err = HashManifest::parse(&text).unwrap_err();
        assert!(matches!(err, ValidationError::ManifestParse { line: 1, .. }));
    }

    #[test]
    fn parse_rejects_duplicates() {
        let d = sha256_digest(b"x").to_hex();
        let text = format!("{d}  replica\n{d}  replica\n");
        assert_eq!(
            HashManifest::parse(&text).unwrap_err(),
            ValidationError::DuplicateManifestEntry("replica".to_string())
        );
    }

    #[test]
    fn parse_reports_line_number() {
        let d = sha256_digest(b"x").to_hex();
        let text = format!("{d}  replica\nnot a manifest line at all, clearly not\n");
        match HashManifest::parse(&text).unwrap_err() {
            ValidationError::ManifestParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn insert_rejects_reserved_names() {
        let mut m = HashManifest::new();
        assert!(m.insert(name(MANIFEST_FILE_NAME), sha256_digest(b"")).is_err());
        assert!(m.insert(name("replica.sig"), sha256_digest(b"")).is_err());
        assert!(m.is_empty());
    }

    #[test]
    fn from_iter_drops_reserved_names() {
        let m: HashManifest = vec![
            (name("replica"), sha256_digest(b"r")),
            (name("SHA256SUMS"), sha256_digest(b"m")),
        ]
        .into_iter()
        .collect();
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn canonical_bytes_match_render() {
        let m = sample();
        assert_eq!(m.canonical_bytes().as_bytes(), m.render().as_bytes());
    }

    #[test]
    fn json_form_is_a_flat_object() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.is_object());
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn insertion_order_does_not_change_rendering(
            names in proptest::collection::btree_set("[a-z][a-z0-9_-]{0,12}", 1..12)
        ) {
            let entries: Vec<(ArtifactName, ContentDigest)> = names
                .iter()
                .map(|n| (name(n), sha256_digest(n.as_bytes())))
                .collect();
            let forward: HashManifest = entries.clone().into_iter().collect();
            let backward: HashManifest = entries.into_iter().rev().collect();
            prop_assert_eq!(forward.render(), backward.render());
            prop_assert_eq!(HashManifest::parse(&forward.render()).unwrap(), forward);
        }
    }
}
