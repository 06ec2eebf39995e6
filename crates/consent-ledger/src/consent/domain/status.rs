use serde::Serialize;

use super::consent::Consent;
use super::policy::{Policy, PolicyVersion};

/// Compliance of one subject against one policy's active version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Accepted,
    Missing,
    Outdated,
}

impl ConsentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ConsentStatus::Accepted => "accepted",
            ConsentStatus::Missing => "missing",
            ConsentStatus::Outdated => "outdated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyConsentStatus {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub status: ConsentStatus,
    pub active_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consented_version: Option<String>,
}

/// Reconcile a subject's current active consent (if any) with the policy's active version.
///
/// A consent on an older version still counts as accepted unless the active version
/// demands re-acceptance.
pub fn compute_status(
    policy: &Policy,
    active: &PolicyVersion,
    consent: Option<&Consent>,
) -> PolicyConsentStatus {
    let (status, consented_version) = match consent {
        None => (ConsentStatus::Missing, None),
        Some(consent) if consent.policy_version == active.version => {
            (ConsentStatus::Accepted, Some(consent.policy_version.clone()))
        }
        Some(consent) if active.requires_re_acceptance => {
            (ConsentStatus::Outdated, Some(consent.policy_version.clone()))
        }
        Some(consent) => (ConsentStatus::Accepted, Some(consent.policy_version.clone())),
    };

    PolicyConsentStatus {
        slug: policy.slug.clone(),
        name: policy.name.clone(),
        description: policy.description.clone(),
        status,
        active_version: active.version.clone(),
        consented_version,
    }
}
