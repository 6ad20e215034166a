use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;
use tracing::info;

/// Canonical signing payload: BCS encoding of `(digest, issuer, created_at)`.
///
/// BCS length-prefixes every string, so the concatenation is unambiguous and
/// byte-stable across serde versions (unlike JSON field ordering).
pub fn signing_payload(digest: &str, issuer: &str, created_at: &str) -> Result<Vec<u8>, bcs::Error> {
    bcs::to_bytes(&(digest, issuer, created_at))
}

/// Ed25519 identity used to sign provenance records.
pub struct ProvenanceSigner {
    keypair: SigningKey,
}

impl ProvenanceSigner {
    /// Fresh random identity (tests, throwaway deployments).
    pub fn generate() -> Self {
        let keypair = SigningKey::generate(&mut OsRng);
        Self { keypair }
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self {
            keypair: SigningKey::from_bytes(secret),
        }
    }

    /// Load the hex encoded secret key at `path`, or create one there.
    pub fn load_or_generate(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let encoded = fs::read_to_string(path)?;
            let raw = hex::decode(encoded.trim())?;
            let secret: [u8; 32] = raw
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("key file {} must hold 32 bytes", path.display()))?;
            info!(path = %path.display(), "loaded signing key");
            return Ok(Self::from_bytes(&secret));
        }

        let signer = Self::generate();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, hex::encode(signer.keypair.to_bytes()))?;
        info!(path = %path.display(), "generated new signing key");
        Ok(signer)
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.keypair.verifying_key()
    }

    pub fn sign(&self, digest: &str, issuer: &str, created_at: &str) -> Result<Signature, bcs::Error> {
        let payload = signing_payload(digest, issuer, created_at)?;
        Ok(self.keypair.sign(&payload))
    }

    /// Static verification for third parties holding only the public key.
    pub fn verify(
        key: &VerifyingKey,
        digest: &str,
        issuer: &str,
        created_at: &str,
        signature: &Signature,
    ) -> bool {
        match signing_payload(digest, issuer, created_at) {
            Ok(payload) => key.verify(&payload, signature).is_ok(),
            Err(_) => false,
        }
    }
}
