//! # Streaming SHA-256 of Artifact Files
//!
//! Artifacts can be multi-gigabyte disk images, so digests are computed
//! by streaming through [`Sha256Accumulator`] in fixed-size chunks rather
//! than reading whole files into memory.

use std::io::Read;
use std::path::Path;

use relkit_core::{ContentDigest, Sha256Accumulator};

use crate::error::CryptoError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest everything `reader` yields, returning the digest and byte count.
pub fn sha256_reader<R: Read>(mut reader: R) -> Result<(ContentDigest, u64), CryptoError> {
    let mut acc = Sha256Accumulator::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        acc.update(&buf[..n]);
    }
    let len = acc.len();
    Ok((acc.finalize(), len))
}

/// Digest the file at `path`.
pub fn sha256_file(path: &Path) -> Result<ContentDigest, CryptoError> {
    let file = std::fs::File::open(path)?;
    let (digest, _) = sha256_reader(std::io::BufReader::new(file))?;
    Ok(digest)
}
