//! Entities and invariants: versioned policies, consent records, consent links, and the
//! status reconciliation between them.

pub mod consent;
pub mod error;
pub mod link;
pub mod policy;
pub mod status;

pub use consent::{
    AcceptanceMethod, CaptureContext, Consent, ConsentDraft, ConsentId, ConsentState, Revocation,
    SubjectConsents,
};
pub use error::{DomainError, ErrorKind};
pub use link::{
    ConsentLink, LinkDraft, LinkState, LinkStatus, LinkToken, MAX_LINK_EXPIRY_HOURS,
    MIN_LINK_EXPIRY_HOURS,
};
pub use policy::{NewPolicyVersion, Policy, PolicyVersion, TenantId};
pub use status::{compute_status, ConsentStatus, PolicyConsentStatus};
