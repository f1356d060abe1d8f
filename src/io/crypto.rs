use crate::{error::Result, types::SeparationRequest};
use sha2::{Digest, Sha256};
use std::{fs::File, io::Read, path::Path};

/// Cache key for a request: SHA-256 over the normalized audio file followed
/// by the JSON form of the request parameters.
pub fn fingerprint_file(normalized: &Path, request: &SeparationRequest) -> Result<String> {
    let mut f = File::open(normalized)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    finish(hasher, request)
}

pub fn fingerprint_bytes(normalized: &[u8], request: &SeparationRequest) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(normalized);
    finish(hasher, request)
}

fn finish(mut hasher: Sha256, request: &SeparationRequest) -> Result<String> {
    hasher.update(serde_json::to_vec(request)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprints are lowercase hex SHA-256 digests; anything else is refused
/// before it gets near a filesystem path.
pub fn is_fingerprint(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
