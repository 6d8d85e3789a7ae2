use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Claims carried by a signed session token.
///
/// The token is signed so tampering is detectable, but expiry is enforced
/// against the server-side session row, not the `exp` claim. A single
/// authority for expiry keeps the lazy read-time deletion in charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Issues and checks the two token kinds: signed session tokens and
/// high-entropy email-verification tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a session token for `user_id` expiring at `expires_at`.
    pub fn sign_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> Result<String> {
        let claims = SessionClaims {
            sub: user_id,
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign session token: {}", e)))
    }

    /// Verify a session token's signature and return its claims.
    ///
    /// Integrity check only: expiry is the session store's decision, so the
    /// `exp` claim is decoded but not validated here.
    pub fn verify_session(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }

    /// Generate a raw email-verification token: 32 bytes from the OS RNG,
    /// hex-encoded (256 bits of entropy). Returned to the user exactly once.
    pub fn generate_verification_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// SHA-256 hex digest of a raw verification token. Only this digest is
    /// ever persisted.
    pub fn hash_verification_token(raw: &str) -> String {
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    /// Short human-readable code included in the verification email:
    /// the first 8 hex characters, uppercased.
    pub fn short_code(raw: &str) -> String {
        raw.chars().take(8).collect::<String>().to_uppercase()
    }
}
