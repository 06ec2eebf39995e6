use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;
use super::policy::TenantId;

/// Opaque, globally unique handle addressing a consent link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkToken(pub String);

impl LinkToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored usage state. `Used` is terminal; expiry is derived from the clock, see [`LinkStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    Issued,
    Used { used_at: DateTime<Utc> },
}

/// Validity of a link at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Valid,
    Used { used_at: DateTime<Utc> },
    Expired { expired_at: DateTime<Utc> },
}

impl LinkStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LinkStatus::Valid => "valid",
            LinkStatus::Used { .. } => "used",
            LinkStatus::Expired { .. } => "expired",
        }
    }
}

/// Time-boxed, single-use bundle asking one subject to consent to a set of policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentLink {
    pub token: LinkToken,
    pub tenant_id: TenantId,
    pub subject: String,
    pub policies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(flatten)]
    state: LinkState,
}

pub const MIN_LINK_EXPIRY_HOURS: u32 = 1;
pub const MAX_LINK_EXPIRY_HOURS: u32 = 168;

/// Parameters for a new link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDraft {
    pub tenant_id: TenantId,
    pub subject: String,
    pub policies: Vec<String>,
    pub expires_in_hours: u32,
    pub created_by: String,
}

impl ConsentLink {
    pub fn issue(
        token: LinkToken,
        draft: LinkDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let LinkDraft {
            tenant_id,
            subject,
            policies,
            expires_in_hours,
            created_by,
        } = draft;

        if token.as_str().trim().is_empty() {
            return Err(DomainError::InvalidRequest(
                "link token must not be empty".to_string(),
            ));
        }
        if tenant_id.is_blank() {
            return Err(DomainError::InvalidTenant);
        }
        if subject.trim().is_empty() {
            return Err(DomainError::InvalidSubject);
        }
        if policies.is_empty() || policies.iter().any(|slug| slug.trim().is_empty()) {
            return Err(DomainError::InvalidSlug);
        }
        if !(MIN_LINK_EXPIRY_HOURS..=MAX_LINK_EXPIRY_HOURS).contains(&expires_in_hours) {
            return Err(DomainError::InvalidExpiry {
                requested: expires_in_hours,
                min: MIN_LINK_EXPIRY_HOURS,
                max: MAX_LINK_EXPIRY_HOURS,
            });
        }

        Ok(Self {
            token,
            tenant_id,
            subject,
            policies,
            created_at: now,
            expires_at: now + Duration::hours(i64::from(expires_in_hours)),
            created_by,
            state: LinkState::Issued,
        })
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            LinkState::Issued => None,
            LinkState::Used { used_at } => Some(used_at),
        }
    }

    /// Usage is reported ahead of expiry: a consumed link stays "used" after it lapses.
    pub fn status(&self, now: DateTime<Utc>) -> LinkStatus {
        if let LinkState::Used { used_at } = self.state {
            return LinkStatus::Used { used_at };
        }
        if now > self.expires_at {
            return LinkStatus::Expired {
                expired_at: self.expires_at,
            };
        }
        LinkStatus::Valid
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == LinkStatus::Valid
    }

    /// Same check for read access and before consumption.
    pub fn ensure_valid(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status(now) {
            LinkStatus::Valid => Ok(()),
            LinkStatus::Used { .. } => Err(DomainError::LinkAlreadyUsed),
            LinkStatus::Expired { .. } => Err(DomainError::LinkExpired),
        }
    }

    pub fn mark_used(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_valid(now)?;
        self.state = LinkState::Used { used_at: now };
        Ok(())
    }
}
