//! Bearer token helpers
//!
//! Tokens are HS256 JWTs carrying the caller identity under a `user` claim.
//! Issuer and lifetime come from [`TokenConfig`]; verification enforces the
//! signature, the expiry (when tokens expire) and the issuer (when one is
//! configured).

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::TokenConfig;
use crate::core::error::{ConfigError, ServiceError};

/// Claims of an issued token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims<U> {
    /// The identity the token was issued for
    pub user: U,

    /// Issued at (seconds since epoch)
    pub iat: i64,

    /// Expiration (seconds since epoch), absent when tokens never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Signs and verifies tokens with a shared secret
#[derive(Clone)]
pub struct TokenSigner {
    issuer: Option<String>,
    ttl: Option<Duration>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenSigner {
    /// Build a signer, failing when the configured lifetime does not parse
    pub fn new(config: &TokenConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            issuer: config.issuer.clone(),
            ttl: config.expiry()?,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
        })
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Issue a signed token for `user`
    pub fn issue<U: Serialize>(&self, user: &U) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = TokenClaims {
            user,
            iat: now.timestamp(),
            exp: self.ttl.map(|ttl| (now + ttl).timestamp()),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            ServiceError::InvalidToken {
                reason: format!("failed to sign token: {}", e),
            }
        })
    }

    /// Verify a token and return its claims
    pub fn verify<U: DeserializeOwned>(&self, token: &str) -> Result<TokenClaims<U>, ServiceError> {
        let data = decode::<TokenClaims<U>>(token, &self.decoding_key, &self.validation())
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired".to_string(),
                    ErrorKind::InvalidSignature => "signature mismatch".to_string(),
                    ErrorKind::InvalidIssuer => "issuer mismatch".to_string(),
                    ErrorKind::MissingRequiredClaim(claim) => format!("missing claim '{}'", claim),
                    _ => format!("malformed token: {}", e),
                };
                tracing::debug!(%reason, "Token verification failed");
                ServiceError::InvalidToken { reason }
            })?;

        Ok(data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = self.ttl.is_some();
        if self.ttl.is_some() {
            validation.required_spec_claims.insert("exp".to_string());
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
