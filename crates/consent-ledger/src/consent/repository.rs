use chrono::{DateTime, Utc};

use super::domain::{
    Consent, ConsentId, ConsentLink, LinkToken, Policy, Revocation, TenantId,
};

/// Storage abstraction for policy aggregates.
///
/// `insert` is the definitive uniqueness check for `(tenant, slug)`. `replace` writes the whole
/// aggregate and must only succeed when the stored revision equals `policy.revision()`; the
/// stored copy carries the next revision.
pub trait PolicyRepository: Send + Sync {
    fn find_by_slug(&self, tenant: &TenantId, slug: &str) -> Result<Option<Policy>, RepositoryError>;
    fn find_by_slugs(
        &self,
        tenant: &TenantId,
        slugs: &[String],
    ) -> Result<Vec<Policy>, RepositoryError>;
    fn find_all(&self, tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError>;
    /// Policies holding at least one active version, filtered by the store.
    fn find_all_active(&self, tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError>;
    fn insert(&self, policy: Policy) -> Result<Policy, RepositoryError>;
    fn replace(&self, policy: Policy) -> Result<Policy, RepositoryError>;
}

/// Storage abstraction for consent records. Every multi-record lookup is most-recent-first
/// by acceptance time.
pub trait ConsentRepository: Send + Sync {
    fn find_by_id(
        &self,
        tenant: &TenantId,
        id: &ConsentId,
    ) -> Result<Option<Consent>, RepositoryError>;
    fn find_by_subject(
        &self,
        tenant: &TenantId,
        subject: &str,
    ) -> Result<Vec<Consent>, RepositoryError>;
    fn find_latest_by_subject_and_policy(
        &self,
        tenant: &TenantId,
        subject: &str,
        slug: &str,
    ) -> Result<Option<Consent>, RepositoryError>;
    fn find_active_by_subject_and_policy(
        &self,
        tenant: &TenantId,
        subject: &str,
        slug: &str,
    ) -> Result<Option<Consent>, RepositoryError>;
    fn find_active_by_subject_and_policies(
        &self,
        tenant: &TenantId,
        subject: &str,
        slugs: &[String],
    ) -> Result<Vec<Consent>, RepositoryError>;
    fn insert(&self, consent: Consent) -> Result<Consent, RepositoryError>;
    /// Atomic conditional update: revoke only while the stored record is still active.
    /// `Conflict` when it is already revoked, `NotFound` when it does not exist.
    fn revoke(
        &self,
        tenant: &TenantId,
        id: &ConsentId,
        revocation: Revocation,
    ) -> Result<Consent, RepositoryError>;
}

/// Storage abstraction for consent links.
pub trait ConsentLinkRepository: Send + Sync {
    fn find_by_token(&self, token: &LinkToken) -> Result<Option<ConsentLink>, RepositoryError>;
    fn insert(&self, link: ConsentLink) -> Result<ConsentLink, RepositoryError>;
    /// Atomic conditional update gated on "not yet used and `used_at <= expires_at`".
    /// `Conflict` when the gate fails, `NotFound` when the token is unknown.
    fn mark_used(
        &self,
        token: &LinkToken,
        used_at: DateTime<Utc>,
    ) -> Result<ConsentLink, RepositoryError>;
    fn delete(&self, token: &LinkToken) -> Result<(), RepositoryError>;
    /// Bulk removal of links whose expiry lies before `now`. Returns the number removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
