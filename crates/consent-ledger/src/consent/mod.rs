//! Consent ledger: versioned policies, subject consents, single-use consent links, and the
//! status reconciliation between a policy's active version and what a subject accepted.

pub mod domain;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    AcceptanceMethod, CaptureContext, Consent, ConsentId, ConsentLink, ConsentState,
    ConsentStatus, DomainError, ErrorKind, LinkState, LinkStatus, LinkToken, NewPolicyVersion,
    Policy, PolicyConsentStatus, PolicyVersion, SubjectConsents, TenantId,
};
pub use memory::{InMemoryConsentLinkRepository, InMemoryConsentRepository, InMemoryPolicyRepository};
pub use repository::{ConsentLinkRepository, ConsentRepository, PolicyRepository, RepositoryError};
pub use router::{consent_router, ConsentApi, TENANT_HEADER};
pub use service::{
    ConsentService, CreateConsentRequest, CreateLinkRequest, CreatePolicyRequest, CreatedLink,
    LinkInfo, LinkPolicyInfo, LinkService, LinkSettings, PolicySelection, PolicyService,
    ServiceError, MAX_LINK_EXPIRY_HOURS, MIN_LINK_EXPIRY_HOURS,
};
