//! Bearer token issuing and verification (HS256 JWT).
//!
//! Every token carries `username`, `iat`, `exp` and `iss`. Verification
//! requires a valid signature, an unexpired `exp`, and the configured
//! issuer; a token missing any of those claims is rejected.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Length of the per-process secret generated when `JWT_SECRET` is unset.
const GENERATED_SECRET_LEN: usize = 32;

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expires at (seconds since epoch)
    pub exp: i64,
    pub iss: String,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: Duration,
}

/// Signs and verifies bearer tokens.
///
/// Cheap to clone; keys are shared behind an `Arc`.
#[derive(Clone)]
pub struct TokenService {
    inner: Arc<Keys>,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl TokenService {
    /// Build a token service from configuration.
    ///
    /// Without `JWT_SECRET` a random secret is generated, so tokens become
    /// invalid on restart and cannot be shared between replicas.
    pub fn new(config: &Config) -> Self {
        let secret: Vec<u8> = match &config.jwt_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                warn!("JWT_SECRET not set; using a random per-process signing secret");
                let mut bytes = [0u8; GENERATED_SECRET_LEN];
                rand::rng().fill(&mut bytes);
                bytes.to_vec()
            }
        };
        Self::from_secret(&secret, &config.token_issuer, config.token_ttl)
    }

    /// Build a token service from raw key material.
    pub fn from_secret(secret: &[u8], issuer: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = 0;

        Self {
            inner: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
                validation,
                issuer: issuer.to_string(),
                ttl,
            }),
        }
    }

    /// Issue a token for `username`, valid for the configured TTL.
    pub fn issue(&self, username: &str) -> AppResult<IssuedToken> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(self.inner.ttl.as_secs())
            .map_err(|_| AppError::TokenSigning("token TTL out of range".to_string()))?;

        let claims = Claims {
            username: username.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            iss: self.inner.issuer.clone(),
        };

        let token = self.sign(&claims)?;
        Ok(IssuedToken {
            token,
            expires_in: self.inner.ttl,
        })
    }

    /// Sign arbitrary claims with this service's key.
    pub fn sign(&self, claims: &Claims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.inner.encoding)
            .map_err(|e| AppError::TokenSigning(e.to_string()))
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.inner.decoding, &self.inner.validation).map(|d| d.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn service() -> TokenService {
        TokenService::from_secret(SECRET, "book-search", Duration::from_secs(3600))
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = service();
        let issued = tokens.issue("alice").unwrap();

        let claims = tokens.verify(&issued.token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, "book-search");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(issued.expires_in, Duration::from_secs(3600));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service();
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&Claims {
                username: "alice".into(),
                iat: now - 7200,
                exp: now - 3600,
                iss: "book-search".into(),
            })
            .unwrap();

        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let other = TokenService::from_secret(SECRET, "someone-else", Duration::from_secs(60));
        let token = other.issue("alice").unwrap().token;

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = TokenService::from_secret(
            b"another-secret-another-secret!!!",
            "book-search",
            Duration::from_secs(60),
        );
        let token = other.issue("alice").unwrap().token;

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_token_without_exp_rejected() {
        #[derive(Serialize)]
        struct NoExpiry<'a> {
            username: &'a str,
            iat: i64,
            iss: &'a str,
        }

        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoExpiry {
                username: "alice",
                iat: Utc::now().timestamp(),
                iss: "book-search",
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(service().verify("not.a.token").is_err());
        assert!(service().verify("").is_err());
    }

    #[test]
    fn test_generated_secret_round_trips() {
        let tokens = TokenService::new(&Config::default());
        let token = tokens.issue("bob").unwrap().token;
        assert_eq!(tokens.verify(&token).unwrap().username, "bob");

        // A second service gets its own random secret
        let other = TokenService::new(&Config::default());
        assert!(other.verify(&token).is_err());
    }
}
