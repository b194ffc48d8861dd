//! End-user identity for the authorization endpoint.
//!
//! Login UI and session handling live outside this crate. The authorization
//! engine only asks an [`IdentityProvider`] who the current user is.

use super::types::SubjectClaims;

/// Resolves the already-authenticated end user.
pub trait IdentityProvider: Send + Sync {
    fn current_subject(&self) -> SubjectClaims;
}

/// Always returns the same user.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    subject: SubjectClaims,
}

impl StaticIdentity {
    #[must_use]
    pub const fn new(subject: SubjectClaims) -> Self {
        Self { subject }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_subject(&self) -> SubjectClaims {
        self.subject.clone()
    }
}
