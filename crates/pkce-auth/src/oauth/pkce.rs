//! PKCE (Proof Key for Code Exchange) helpers.
//!
//! Implements S256 code challenge derivation and verification per RFC 7636,
//! plus the random opaque values used for verifiers, codes and refresh tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// The only accepted `code_challenge_method`.
pub const METHOD_S256: &str = "S256";

/// Random bytes behind codes, refresh tokens and verifiers (256 bits).
const TOKEN_BYTES: usize = 32;

/// Random bytes behind `state` values (128 bits).
const STATE_BYTES: usize = 16;

/// Compute `BASE64URL(SHA256(code_verifier))` without padding.
#[must_use]
pub fn challenge_s256(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Verify a PKCE S256 code challenge.
///
/// Byte-exact comparison of the recomputed challenge with the stored one.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    challenge_s256(code_verifier) == code_challenge
}

/// Generate an opaque URL-safe token from the OS RNG.
#[must_use]
pub fn random_token() -> String {
    random_urlsafe(TOKEN_BYTES)
}

/// Generate a fresh code verifier (43 characters, within RFC 7636's 43..=128).
#[must_use]
pub fn generate_verifier() -> String {
    random_urlsafe(TOKEN_BYTES)
}

/// Generate a CSRF `state` value for the client side of the flow.
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe(STATE_BYTES)
}

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s256_valid() {
        // RFC 7636 Appendix B test vector
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(challenge_s256(verifier), challenge);
        assert!(verify_s256(verifier, challenge));
    }

    #[test]
    fn test_s256_invalid_verifier() {
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(!verify_s256("wrong-verifier", challenge));
    }

    #[test]
    fn test_plain_challenge_never_verifies() {
        // A client that sent the verifier itself as the challenge ("plain") must fail.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert!(!verify_s256(verifier, verifier));
    }

    #[test]
    fn test_padded_challenge_rejected() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert!(!verify_s256(verifier, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM="));
    }

    #[test]
    fn test_generated_values() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 43);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(generate_verifier(), verifier);

        assert_eq!(generate_state().len(), 22);
        assert_eq!(random_token().len(), 43);
    }
}
