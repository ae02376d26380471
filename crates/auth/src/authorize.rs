use core::str::FromStr;

use serde::{Deserialize, Serialize};

use medisync_core::UserId;

use crate::{AuthzError, Claims, Role};

/// Named authorization policy attached to a route.
///
/// Closed set: a route cannot be wired with a rule that has no evaluation
/// logic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Any verified caller.
    Any,
    /// Callers holding the admin role.
    AdminOnly,
    /// Callers holding the user role.
    UserOnly,
    /// Admins, or the caller acting on their own record.
    AdminOrSubject,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Any => "any",
            Rule::AdminOnly => "admin_only",
            Rule::UserOnly => "user_only",
            Rule::AdminOrSubject => "admin_or_subject",
        }
    }

    /// Decide this rule for `req`, with the reason for the outcome.
    fn decide(&self, req: &AuthorizationRequest) -> (bool, String) {
        let claims = &req.claims;
        match self {
            Rule::Any => (true, "any verified caller is allowed".to_string()),
            Rule::AdminOnly => {
                if claims.has_role(Role::Admin) {
                    (true, "caller holds the ADMIN role".to_string())
                } else {
                    (false, "caller does not hold the ADMIN role".to_string())
                }
            }
            Rule::UserOnly => {
                if claims.has_role(Role::User) {
                    (true, "caller holds the USER role".to_string())
                } else {
                    (false, "caller does not hold the USER role".to_string())
                }
            }
            Rule::AdminOrSubject => {
                if claims.has_role(Role::Admin) {
                    return (true, "caller holds the ADMIN role".to_string());
                }
                match req.requested_subject {
                    None => (false, "no subject resolved and caller is not an admin".to_string()),
                    Some(subject) if subject == claims.sub => (true, "caller is the requested subject".to_string()),
                    Some(subject) => (
                        false,
                        format!("caller {} is neither an admin nor subject {subject}", claims.sub),
                    ),
                }
            }
        }
    }
}

impl core::fmt::Display for Rule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Rule::Any),
            "admin_only" => Ok(Rule::AdminOnly),
            "user_only" => Ok(Rule::UserOnly),
            "admin_or_subject" => Ok(Rule::AdminOrSubject),
            other => Err(format!("unknown rule '{other}'")),
        }
    }
}

/// Input to a single authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub claims: Claims,
    /// The user the request targets, if one was resolved.
    pub requested_subject: Option<UserId>,
}

impl AuthorizationRequest {
    /// The nil id counts as "no subject".
    pub fn new(claims: Claims, requested_subject: Option<UserId>) -> Self {
        Self {
            claims,
            requested_subject: requested_subject.filter(|id| !id.is_nil()),
        }
    }

    pub fn without_subject(claims: Claims) -> Self {
        Self::new(claims, None)
    }
}

/// Detailed explanation of an authorization decision (audit trail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub rule: Rule,
    pub granted: bool,
    pub reason: String,
    pub caller: UserId,
    pub roles: Vec<Role>,
    pub requested_subject: Option<UserId>,
}

/// Evaluates [`Rule`]s against claims.
///
/// - No IO
/// - No panics
/// - Absence of a subject is never read as a match
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationEngine;

impl AuthorizationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Allow (`Ok`) or deny with [`AuthzError::PermissionDenied`].
    pub fn evaluate(&self, rule: Rule, req: &AuthorizationRequest) -> Result<(), AuthzError> {
        let (granted, reason) = rule.decide(req);
        if granted {
            Ok(())
        } else {
            Err(AuthzError::denied(rule, reason))
        }
    }

    /// Same decision as [`evaluate`](Self::evaluate), with the inputs that led to it.
    pub fn explain(&self, rule: Rule, req: &AuthorizationRequest) -> AuthorizationExplanation {
        let (granted, reason) = rule.decide(req);
        AuthorizationExplanation {
            rule,
            granted,
            reason,
            caller: req.claims.sub,
            roles: req.claims.roles.iter().copied().collect(),
            requested_subject: req.requested_subject,
        }
    }
}
