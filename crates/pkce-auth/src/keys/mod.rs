//! Signing key management and JWKS publication.
//!
//! A [`KeyManager`] holds one RSA key pair for the life of the process. The
//! private half is only ever used inside [`KeyManager::sign`]; the public half
//! is exported as a JWK tagged with its `kid`, `use` and `alg`.

pub mod remote;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::error::{JwksError, KeyError};

pub use remote::RemoteJwks;

/// The only signing algorithm issued or accepted.
pub const ALGORITHM: Algorithm = Algorithm::RS256;

const ALGORITHM_NAME: &str = "RS256";

/// An RSA public key in JWK form (RFC 7517).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub n: String,
    pub e: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Jwk {
    /// Build a verification key, refusing anything that is not an RS256 signing key.
    pub fn decoding_key(&self) -> Result<DecodingKey, JwksError> {
        if self.kty != "RSA" {
            return Err(JwksError::InvalidJwk(format!("unsupported kty {}", self.kty)));
        }
        if self.alg.as_deref().is_some_and(|alg| alg != ALGORITHM_NAME) {
            return Err(JwksError::InvalidJwk(format!("unsupported alg {:?}", self.alg)));
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(JwksError::InvalidJwk(format!("key use {:?} is not sig", self.key_use)));
        }
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| JwksError::InvalidJwk(e.to_string()))
    }
}

/// A published key set: `{"keys": [..]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Header fields a caller may set. `alg` and `kid` are fixed by the key manager.
#[derive(Debug, Clone, Default)]
pub struct HeaderOverrides {
    pub typ: Option<String>,
    pub cty: Option<String>,
}

impl HeaderOverrides {
    /// JWT access token profile (RFC 9068).
    #[must_use]
    pub fn access_token() -> Self {
        Self { typ: Some("at+jwt".to_string()), cty: None }
    }
}

/// Process-wide signing key pair.
pub struct KeyManager {
    key_id: String,
    encoding_key: EncodingKey,
    decoding_key: Arc<DecodingKey>,
    public_jwk: Jwk,
}

impl KeyManager {
    /// Generate a fresh key pair. Tokens signed with it die with the process.
    pub fn generate(key_id: impl Into<String>) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, defaults::RSA_KEY_BITS)?;
        Self::from_private_key(&private_key, key_id.into())
    }

    /// Load a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str, key_id: impl Into<String>) -> Result<Self, KeyError> {
        let private_key = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| KeyError::InvalidKey(e.to_string()))?,
        };
        Self::from_private_key(&private_key, key_id.into())
    }

    pub fn from_pem_file(path: impl AsRef<Path>, key_id: impl Into<String>) -> Result<Self, KeyError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path)
            .map_err(|source| KeyError::Io { path: path.to_path_buf(), source })?;
        Self::from_pem(&pem, key_id)
    }

    fn from_private_key(private_key: &RsaPrivateKey, key_id: String) -> Result<Self, KeyError> {
        let der = private_key.to_pkcs1_der().map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        let public_key = private_key.to_public_key();
        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)?;

        let public_jwk = Jwk {
            kty: "RSA".to_string(),
            n,
            e,
            key_use: Some("sig".to_string()),
            alg: Some(ALGORITHM_NAME.to_string()),
            kid: Some(key_id.clone()),
        };

        Ok(Self { key_id, encoding_key, decoding_key: Arc::new(decoding_key), public_jwk })
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign `claims` as a compact JWS with `alg=RS256` and this key's `kid`.
    pub fn sign<C: Serialize>(&self, claims: &C, overrides: &HeaderOverrides) -> Result<String, KeyError> {
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(self.key_id.clone());
        if let Some(typ) = &overrides.typ {
            header.typ = Some(typ.clone());
        }
        header.cty.clone_from(&overrides.cty);

        Ok(jsonwebtoken::encode(&header, claims, &self.encoding_key)?)
    }

    /// The public key for publication.
    #[must_use]
    pub fn export_public_key(&self) -> Jwk {
        self.public_jwk.clone()
    }

    /// The JWKS document served at `/.well-known/jwks.json`.
    #[must_use]
    pub fn jwks(&self) -> JwkSet {
        JwkSet { keys: vec![self.export_public_key()] }
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

/// Where the resource guard gets verification keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// The verification key for `kid`.
    async fn verification_key(&self, kid: Option<&str>) -> Result<Arc<DecodingKey>, JwksError>;
}

/// In-process verification against the key manager's own public key.
#[async_trait]
impl KeySource for KeyManager {
    async fn verification_key(&self, kid: Option<&str>) -> Result<Arc<DecodingKey>, JwksError> {
        match kid {
            Some(kid) if kid != self.key_id => Err(JwksError::UnknownKid(Some(kid.to_string()))),
            _ => Ok(Arc::clone(&self.decoding_key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{Validation, decode, decode_header};

    use super::*;

    const PKCS8_PEM: &str = include_str!("../../tests/fixtures/signing_key.pem");
    const PKCS1_PEM: &str = include_str!("../../tests/fixtures/foreign_key_pkcs1.pem");

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_load_pkcs8_and_pkcs1() {
        assert_eq!(KeyManager::from_pem(PKCS8_PEM, "k1").unwrap().key_id(), "k1");
        assert_eq!(KeyManager::from_pem(PKCS1_PEM, "k2").unwrap().key_id(), "k2");
    }

    #[test]
    fn test_invalid_pem() {
        let err = KeyManager::from_pem("not a key", "k").unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = KeyManager::from_pem_file("/nonexistent/key.pem", "k").unwrap_err();
        assert!(matches!(err, KeyError::Io { .. }));
    }

    #[test]
    fn test_export_shape() {
        let keys = KeyManager::from_pem(PKCS8_PEM, "demo-key-1").unwrap();
        let json = serde_json::to_value(keys.jwks()).unwrap();
        let jwk = &json["keys"][0];

        assert_eq!(jwk["kty"], "RSA");
        assert_eq!(jwk["use"], "sig");
        assert_eq!(jwk["alg"], "RS256");
        assert_eq!(jwk["kid"], "demo-key-1");
        assert_eq!(jwk["e"], "AQAB");
        assert!(jwk.get("d").is_none(), "private exponent must never be exported");
    }

    #[test]
    fn test_sign_sets_fixed_header() {
        let keys = KeyManager::from_pem(PKCS8_PEM, "demo-key-1").unwrap();
        let token = keys
            .sign(&Claims { sub: "alice".into(), exp: far_future() }, &HeaderOverrides::access_token())
            .unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("demo-key-1"));
        assert_eq!(header.typ.as_deref(), Some("at+jwt"));
    }

    #[test]
    fn test_exported_key_verifies_signature() {
        let keys = KeyManager::from_pem(PKCS8_PEM, "demo-key-1").unwrap();
        let claims = Claims { sub: "alice".into(), exp: far_future() };
        let token = keys.sign(&claims, &HeaderOverrides::default()).unwrap();

        let decoding_key = keys.export_public_key().decoding_key().unwrap();
        let mut validation = Validation::new(ALGORITHM);
        validation.required_spec_claims.clear();
        let data = decode::<Claims>(&token, &decoding_key, &validation).unwrap();
        assert_eq!(data.claims, claims);
    }

    #[test]
    fn test_jwk_rejects_other_algorithms() {
        let mut jwk = KeyManager::from_pem(PKCS8_PEM, "k").unwrap().export_public_key();
        jwk.alg = Some("HS256".into());
        assert!(jwk.decoding_key().is_err());

        jwk.alg = None;
        jwk.key_use = Some("enc".into());
        assert!(jwk.decoding_key().is_err());
    }

    #[tokio::test]
    async fn test_local_key_source_checks_kid() {
        let keys = KeyManager::from_pem(PKCS8_PEM, "demo-key-1").unwrap();
        assert!(keys.verification_key(Some("demo-key-1")).await.is_ok());
        assert!(keys.verification_key(None).await.is_ok());
        assert!(matches!(
            keys.verification_key(Some("other")).await,
            Err(JwksError::UnknownKid(_))
        ));
    }

    #[test]
    fn test_generate() {
        let keys = KeyManager::generate("fresh").unwrap();
        assert_eq!(keys.export_public_key().kid.as_deref(), Some("fresh"));
    }
}
