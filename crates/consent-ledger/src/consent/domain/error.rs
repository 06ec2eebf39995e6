use serde::Serialize;

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Expired,
    State,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Expired => "expired",
            ErrorKind::State => "state",
        }
    }
}

/// Business rule violations raised by the entities and orchestration services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("invalid tenant id")]
    InvalidTenant,
    #[error("invalid subject")]
    InvalidSubject,
    #[error("invalid policy slug")]
    InvalidSlug,
    #[error("invalid policy version '{version}'")]
    InvalidVersion { version: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("link expiry must be between {min} and {max} hours (got {requested})")]
    InvalidExpiry { requested: u32, min: u32, max: u32 },
    #[error("policy '{slug}' not found")]
    PolicyNotFound { slug: String },
    #[error("policies not found: {}", .slugs.join(", "))]
    PoliciesNotFound { slugs: Vec<String> },
    #[error("consent '{id}' not found")]
    ConsentNotFound { id: String },
    #[error("no consent found for subject '{subject}' on policy '{slug}'")]
    SubjectConsentNotFound { subject: String, slug: String },
    #[error("consent link not found")]
    LinkNotFound,
    #[error("policy '{slug}' already exists")]
    PolicyAlreadyExists { slug: String },
    #[error("version '{version}' already exists")]
    VersionAlreadyExists { version: String },
    #[error("consent already revoked")]
    ConsentAlreadyRevoked,
    #[error("consent link has already been used")]
    LinkAlreadyUsed,
    #[error("consent link has expired")]
    LinkExpired,
    #[error("policy '{slug}' has no active version")]
    NoActiveVersion { slug: String },
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidTenant
            | DomainError::InvalidSubject
            | DomainError::InvalidSlug
            | DomainError::InvalidVersion { .. }
            | DomainError::InvalidRequest(_)
            | DomainError::InvalidExpiry { .. } => ErrorKind::Validation,
            DomainError::PolicyNotFound { .. }
            | DomainError::PoliciesNotFound { .. }
            | DomainError::ConsentNotFound { .. }
            | DomainError::SubjectConsentNotFound { .. }
            | DomainError::LinkNotFound => ErrorKind::NotFound,
            DomainError::PolicyAlreadyExists { .. }
            | DomainError::VersionAlreadyExists { .. }
            | DomainError::ConsentAlreadyRevoked
            | DomainError::LinkAlreadyUsed => ErrorKind::Conflict,
            DomainError::LinkExpired => ErrorKind::Expired,
            DomainError::NoActiveVersion { .. } => ErrorKind::State,
        }
    }
}
