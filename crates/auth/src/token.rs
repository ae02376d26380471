//! Token issuance and verification.
//!
//! Wire format is a compact JWS: `b64url(header).b64url(claims).b64url(sig)`
//! with header `{alg: "RS256", typ: "JWT", kid}`. The kid in the header
//! selects the verification key directly, so verification cost does not grow
//! with the number of registered keys.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation};

use medisync_core::UserId;

use crate::keystore::SIGNING_ALGORITHM;
use crate::{Claims, KeyStore, Role, TokenError, validate_claims};

/// Issues and verifies signed identity tokens against a [`KeyStore`].
#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: Arc<KeyStore>,
    issuer: String,
    ttl: Duration,
    validation: Validation,
}

impl TokenCodec {
    /// `issuer` is stamped into minted tokens and required on verified ones.
    pub fn new(keys: Arc<KeyStore>, issuer: impl Into<String>, ttl: Duration) -> Self {
        // Only the signature is checked by jsonwebtoken; the time window and
        // issuer are checked here against an explicit `now`.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::new();

        Self {
            keys,
            issuer: issuer.into(),
            ttl,
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Sign `claims` with the active key.
    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        let pair = self.keys.private_key_for_signing().map_err(TokenError::NoSigningKey)?;

        let mut header = Header::new(pair.algorithm());
        header.kid = Some(pair.kid().to_string());

        jsonwebtoken::encode(&header, claims, pair.encoding_key()).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Build claims for `user_id` with the configured issuer and TTL, then sign them.
    pub fn mint(
        &self,
        user_id: UserId,
        roles: impl IntoIterator<Item = Role>,
        now: DateTime<Utc>,
    ) -> Result<(String, Claims), TokenError> {
        let claims = Claims::new(user_id, roles, self.issuer.clone(), now, self.ttl)?;
        let token = self.issue(&claims)?;
        Ok((token, claims))
    }

    /// Verify `token` at instant `now` and return its claims.
    ///
    /// Checks run in a fixed order: structure, kid, signature, claim
    /// decoding, validity window, issuer. Claims are never returned unless
    /// the signature verified.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed("expected three dot-separated segments".to_string()));
        }

        let header = jsonwebtoken::decode_header(token).map_err(|e| TokenError::Malformed(format!("header: {e}")))?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(TokenError::Malformed(format!("unsupported algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| TokenError::Malformed("header has no kid".to_string()))?;

        let pair = self.keys.public_key_for_verification(&kid).map_err(TokenError::InvalidToken)?;

        let data = jsonwebtoken::decode::<Claims>(token, pair.decoding_key(), &self.validation).map_err(map_decode_error)?;
        let claims = data.claims;

        validate_claims(&claims, now)?;

        if claims.iss != self.issuer {
            return Err(TokenError::InvalidIssuer {
                expected: self.issuer.clone(),
                actual: claims.iss,
            });
        }

        Ok(claims)
    }
}

fn map_decode_error(error: jsonwebtoken::errors::Error) -> TokenError {
    match error.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        // Base64/JSON/UTF-8 failures in the claims segment, or anything else
        // that stops the token from being read.
        _ => TokenError::Malformed(error.to_string()),
    }
}
