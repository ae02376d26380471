use std::collections::BTreeSet;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use medisync_core::UserId;

use crate::{Role, TokenError};

/// Verified identity claims carried by a token.
///
/// Field names on the wire follow the registered JWT claim names so any
/// standard bearer-token consumer can read them. Timestamps are NumericDate
/// seconds, hence whole-second precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user the token was issued to.
    pub sub: UserId,

    pub roles: BTreeSet<Role>,

    pub iss: String,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    /// Build claims valid for `ttl` from `issued_at`, truncated to seconds.
    ///
    /// Fails with [`TokenError::TtlOutOfRange`] when `issued_at + ttl` is not
    /// a representable instant.
    pub fn new(
        sub: UserId,
        roles: impl IntoIterator<Item = Role>,
        iss: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, TokenError> {
        let issued_at = issued_at.trunc_subsecs(0);
        let expires_at = issued_at.checked_add_signed(ttl).ok_or(TokenError::TtlOutOfRange)?;
        Ok(Self {
            sub,
            roles: roles.into_iter().collect(),
            iss: iss.into(),
            issued_at,
            expires_at,
        })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Check the validity window of decoded claims at `now`.
///
/// A token is usable while `now < exp`; `exp` must lie strictly after `iat`.
pub fn validate_claims(claims: &Claims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenError::InvalidTimeWindow);
    }
    if now >= claims.expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}
