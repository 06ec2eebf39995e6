//! Stateless orchestration over the repository contracts. Each call loads what it needs,
//! applies the entity rules, and writes back; nothing is cached between calls.

mod consent;
mod link;
mod policy;

pub use consent::{ConsentService, CreateConsentRequest, PolicySelection};
pub use link::{
    CreateLinkRequest, CreatedLink, LinkInfo, LinkPolicyInfo, LinkService, LinkSettings,
    MAX_LINK_EXPIRY_HOURS, MIN_LINK_EXPIRY_HOURS,
};
pub use policy::{CreatePolicyRequest, PolicyService};

use super::domain::{DomainError, ErrorKind, Policy, TenantId};
use super::repository::{PolicyRepository, RepositoryError};

/// Error raised by the orchestration services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// Domain classification, or `None` for storage failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Domain(err) => Some(err.kind()),
            ServiceError::Repository(_) => None,
        }
    }
}

fn require_tenant(tenant: &TenantId) -> Result<(), DomainError> {
    if tenant.is_blank() {
        Err(DomainError::InvalidTenant)
    } else {
        Ok(())
    }
}

fn require_subject(subject: &str) -> Result<(), DomainError> {
    if subject.trim().is_empty() {
        Err(DomainError::InvalidSubject)
    } else {
        Ok(())
    }
}

fn load_policy<P>(repository: &P, tenant: &TenantId, slug: &str) -> Result<Policy, ServiceError>
where
    P: PolicyRepository + ?Sized,
{
    repository
        .find_by_slug(tenant, slug)?
        .ok_or_else(|| {
            DomainError::PolicyNotFound {
                slug: slug.to_string(),
            }
            .into()
        })
}
