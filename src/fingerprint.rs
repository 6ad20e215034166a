use img_hash::{HashAlg, HasherConfig, ImageHash};
use sha2::{Digest, Sha256};

use crate::error::ProbeFailure;

/// Cryptographic identity of an asset: lowercase hex SHA-256 of the raw bytes.
///
/// Any single changed byte (metadata included) changes the digest, which is
/// what binds a provenance record to exactly one artifact.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Perceptual identity of a still image: 64-bit gradient hash, base64 encoded.
///
/// Unlike the SHA-256 digest this survives recompression and resizing, so it
/// is used to recognise near-duplicates of registered works.
pub fn perceptual_hash(bytes: &[u8]) -> Result<String, ProbeFailure> {
    let img = img_hash::image::load_from_memory(bytes)
        .map_err(|e| ProbeFailure::Decode(e.to_string()))?;

    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Gradient)
        .hash_size(8, 8)
        .to_hasher();

    Ok(hasher.hash_image(&img).to_base64())
}

/// Hamming distance between two encoded perceptual hashes, `None` if either
/// does not decode.
pub fn perceptual_distance(a: &str, b: &str) -> Option<u32> {
    let a: ImageHash = ImageHash::from_base64(a).ok()?;
    let b: ImageHash = ImageHash::from_base64(b).ok()?;
    Some(a.dist(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_sha256() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn perceptual_hash_rejects_non_images() {
        assert!(perceptual_hash(b"definitely not an image").is_err());
    }

    #[test]
    fn distance_of_garbage_is_none() {
        assert_eq!(perceptual_distance("!!", "!!"), None);
    }
}
