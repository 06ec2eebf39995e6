use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Path segment that addresses a policy's active version, so it cannot name a version.
pub const ACTIVE_VERSION_ALIAS: &str = "active";

/// Identifier wrapper for the isolation boundary every record is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable snapshot of policy content. Only `is_active` ever changes, and only through
/// [`Policy::add_version`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub version: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub content_html: String,
    #[serde(default)]
    pub content_markdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub is_active: bool,
    pub requires_re_acceptance: bool,
}

/// Caller supplied content for a version about to be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPolicyVersion {
    pub version: String,
    #[serde(default)]
    pub content_html: String,
    #[serde(default)]
    pub content_markdown: String,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub requires_re_acceptance: bool,
}

impl NewPolicyVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn active(mut self) -> Self {
        self.is_active = true;
        self
    }

    pub fn requiring_re_acceptance(mut self) -> Self {
        self.requires_re_acceptance = true;
        self
    }
}

/// Versioned legal text a subject consents to.
///
/// The version list is append-only and holds at most one active entry. The whole aggregate
/// is the unit of persistence; `revision` lets stores reject a replace built from a stale read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub tenant_id: TenantId,
    pub slug: String,
    pub name: String,
    pub description: String,
    versions: Vec<PolicyVersion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    revision: u64,
}

impl Policy {
    pub fn new(
        tenant_id: TenantId,
        slug: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let slug = slug.into();
        if tenant_id.is_blank() {
            return Err(DomainError::InvalidTenant);
        }
        if slug.trim().is_empty() {
            return Err(DomainError::InvalidSlug);
        }

        Ok(Self {
            tenant_id,
            slug,
            name: name.into(),
            description: description.into(),
            versions: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    pub fn versions(&self) -> &[PolicyVersion] {
        &self.versions
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Called by storage adapters once a replace has been accepted.
    pub fn advance_revision(&mut self) {
        self.revision += 1;
    }

    /// Append a version. Activating it deactivates every earlier version.
    pub fn add_version(
        &mut self,
        spec: NewPolicyVersion,
        now: DateTime<Utc>,
    ) -> Result<&PolicyVersion, DomainError> {
        if spec.version.trim().is_empty() || spec.version == ACTIVE_VERSION_ALIAS {
            return Err(DomainError::InvalidVersion {
                version: spec.version,
            });
        }
        if self.versions.iter().any(|v| v.version == spec.version) {
            return Err(DomainError::VersionAlreadyExists {
                version: spec.version,
            });
        }

        if spec.is_active {
            for existing in &mut self.versions {
                existing.is_active = false;
            }
        }

        self.versions.push(PolicyVersion {
            version: spec.version,
            published_at: now,
            content_html: spec.content_html,
            content_markdown: spec.content_markdown,
            pdf_url: spec.pdf_url,
            is_active: spec.is_active,
            requires_re_acceptance: spec.requires_re_acceptance,
        });
        self.updated_at = now;

        Ok(&self.versions[self.versions.len() - 1])
    }

    pub fn active_version(&self) -> Result<&PolicyVersion, DomainError> {
        self.versions
            .iter()
            .find(|v| v.is_active)
            .ok_or_else(|| DomainError::NoActiveVersion {
                slug: self.slug.clone(),
            })
    }

    pub fn has_active_version(&self) -> bool {
        self.versions.iter().any(|v| v.is_active)
    }

    /// Exact, case-sensitive label lookup.
    pub fn version(&self, label: &str) -> Result<&PolicyVersion, DomainError> {
        self.versions
            .iter()
            .find(|v| v.version == label)
            .ok_or_else(|| DomainError::InvalidVersion {
                version: label.to_string(),
            })
    }
}
