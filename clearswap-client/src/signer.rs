//! Signer adapter.
//!
//! Wraps an in-memory secp256k1 wallet and produces signatures on demand.
//! Two kinds are used: the privileged main-wallet signer (loaded from
//! configuration, signs the auth challenge) and an ephemeral session signer
//! (generated fresh per authentication attempt, signs every request after
//! the handshake, never persisted).

use ethers::signers::{LocalWallet, Signer};
use ethers::types::H256;
use ethers::utils::{keccak256, to_checksum};

use clearswap_core::error::{Result, SwapError};

/// Domain prefix mixed into every challenge digest so a challenge
/// signature cannot be replayed as a plain message signature.
const CHALLENGE_DOMAIN: &[u8] = b"clearswap-auth-v1";

/// A secp256k1 signer bound to one wallet.
#[derive(Clone)]
pub struct SignerAdapter {
    wallet: LocalWallet,
}

impl SignerAdapter {
    /// Loads a signer from a hex private key, with or without `0x` prefix.
    pub fn from_private_key(key: &str) -> Result<Self> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let wallet: LocalWallet = key
            .parse()
            .map_err(|e| SwapError::Signer(format!("invalid private key: {e}")))?;
        Ok(Self { wallet })
    }

    /// Generates a fresh ephemeral signer.
    pub fn ephemeral() -> Self {
        Self {
            wallet: LocalWallet::new(&mut rand::thread_rng()),
        }
    }

    /// Checksummed address of this signer.
    pub fn address(&self) -> String {
        to_checksum(&self.wallet.address(), None)
    }

    /// Signs a 32-byte digest, returning a 65-byte signature as 0x-hex.
    pub fn sign_digest(&self, digest: [u8; 32]) -> Result<String> {
        let sig = self
            .wallet
            .sign_hash(H256::from(digest))
            .map_err(|e| SwapError::Signer(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(sig.to_vec())))
    }

    /// Signs arbitrary payload bytes via their keccak256 digest.
    pub fn sign_payload(&self, payload: &[u8]) -> Result<String> {
        self.sign_digest(keccak256(payload))
    }

    /// Signs an auth challenge with domain separation.
    ///
    /// The digest commits to the domain tag, the application name, the
    /// challenge value, and the original auth parameters, so the server can
    /// verify the signature covers exactly what it issued.
    pub fn sign_challenge(
        &self,
        app_name: &str,
        challenge: &str,
        auth_params: &serde_json::Value,
    ) -> Result<String> {
        let params_digest = keccak256(auth_params.to_string().as_bytes());
        let mut preimage = Vec::with_capacity(
            CHALLENGE_DOMAIN.len() + app_name.len() + challenge.len() + params_digest.len(),
        );
        preimage.extend_from_slice(CHALLENGE_DOMAIN);
        preimage.extend_from_slice(app_name.as_bytes());
        preimage.extend_from_slice(challenge.as_bytes());
        preimage.extend_from_slice(&params_digest);
        self.sign_digest(keccak256(&preimage))
    }
}

impl std::fmt::Debug for SignerAdapter {
    // Never print key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerAdapter")
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f";

    #[test]
    fn test_from_private_key_accepts_both_prefixes() {
        let bare = SignerAdapter::from_private_key(TEST_KEY).unwrap();
        let prefixed = SignerAdapter::from_private_key(&format!("0x{TEST_KEY}")).unwrap();
        assert_eq!(bare.address(), prefixed.address());
    }

    #[test]
    fn test_rejects_garbage_key() {
        assert!(matches!(
            SignerAdapter::from_private_key("not hex"),
            Err(SwapError::Signer(_))
        ));
    }

    #[test]
    fn test_ephemeral_signers_are_distinct() {
        let a = SignerAdapter::ephemeral();
        let b = SignerAdapter::ephemeral();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_signature_shape() {
        let signer = SignerAdapter::from_private_key(TEST_KEY).unwrap();
        let sig = signer.sign_payload(b"payload").unwrap();
        assert!(sig.starts_with("0x"));
        // 65 bytes -> 130 hex chars
        assert_eq!(sig.len(), 2 + 130);
    }

    #[test]
    fn test_challenge_signing_is_deterministic_and_domain_bound() {
        let signer = SignerAdapter::from_private_key(TEST_KEY).unwrap();
        let params = serde_json::json!({"address": "0xabc", "scope": "clearswap.swaps"});

        let one = signer.sign_challenge("clearswap", "challenge-1", &params).unwrap();
        let two = signer.sign_challenge("clearswap", "challenge-1", &params).unwrap();
        assert_eq!(one, two);

        let other = signer.sign_challenge("clearswap", "challenge-2", &params).unwrap();
        assert_ne!(one, other);
    }

    #[test]
    fn test_debug_hides_key_material() {
        let signer = SignerAdapter::from_private_key(TEST_KEY).unwrap();
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("address"));
        assert!(!rendered.contains(TEST_KEY));
    }
}
