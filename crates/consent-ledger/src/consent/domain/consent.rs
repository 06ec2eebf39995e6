use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;
use super::link::LinkToken;
use super::policy::TenantId;

/// Identifier wrapper for stored consent records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentId(pub String);

impl ConsentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the subject reached the acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceMethod {
    Direct,
    Link,
}

impl AcceptanceMethod {
    pub const fn label(self) -> &'static str {
        match self {
            AcceptanceMethod::Direct => "direct",
            AcceptanceMethod::Link => "link",
        }
    }
}

/// Request metadata captured alongside an acceptance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl CaptureContext {
    pub fn is_empty(&self) -> bool {
        self.ip_address.is_none() && self.user_agent.is_none()
    }
}

/// Who revoked a consent and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub revoked_at: DateTime<Utc>,
    pub revoked_by: String,
}

/// Lifecycle of a consent. `Revoked` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsentState {
    Active,
    Revoked {
        revoked_at: DateTime<Utc>,
        revoked_by: String,
    },
}

/// Everything needed to record an acceptance except its identity and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentDraft {
    pub tenant_id: TenantId,
    pub subject: String,
    pub policy_slug: String,
    pub policy_version: String,
    pub method: AcceptanceMethod,
    pub link_token: Option<LinkToken>,
    pub capture: Option<CaptureContext>,
}

/// A subject's acceptance of one policy version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub id: ConsentId,
    pub tenant_id: TenantId,
    pub subject: String,
    pub policy_slug: String,
    pub policy_version: String,
    pub accepted_at: DateTime<Utc>,
    pub acceptance_method: AcceptanceMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_token: Option<LinkToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureContext>,
    #[serde(flatten)]
    state: ConsentState,
}

impl Consent {
    pub fn record(
        id: ConsentId,
        draft: ConsentDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let ConsentDraft {
            tenant_id,
            subject,
            policy_slug,
            policy_version,
            method,
            link_token,
            capture,
        } = draft;

        if tenant_id.is_blank() {
            return Err(DomainError::InvalidTenant);
        }
        if subject.trim().is_empty() {
            return Err(DomainError::InvalidSubject);
        }
        if policy_slug.trim().is_empty() {
            return Err(DomainError::InvalidSlug);
        }
        if policy_version.trim().is_empty() {
            return Err(DomainError::InvalidVersion {
                version: policy_version,
            });
        }
        if method == AcceptanceMethod::Link && link_token.is_none() {
            return Err(DomainError::InvalidRequest(
                "link acceptance requires the originating link token".to_string(),
            ));
        }

        Ok(Self {
            id,
            tenant_id,
            subject,
            policy_slug,
            policy_version,
            accepted_at: now,
            acceptance_method: method,
            link_token,
            capture: capture.filter(|ctx| !ctx.is_empty()),
            state: ConsentState::Active,
        })
    }

    pub fn state(&self) -> &ConsentState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ConsentState::Active)
    }

    pub fn revocation(&self) -> Option<Revocation> {
        match &self.state {
            ConsentState::Active => None,
            ConsentState::Revoked {
                revoked_at,
                revoked_by,
            } => Some(Revocation {
                revoked_at: *revoked_at,
                revoked_by: revoked_by.clone(),
            }),
        }
    }

    /// One-way transition to `Revoked`.
    pub fn revoke(&mut self, revocation: Revocation) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::ConsentAlreadyRevoked);
        }
        self.state = ConsentState::Revoked {
            revoked_at: revocation.revoked_at,
            revoked_by: revocation.revoked_by,
        };
        Ok(())
    }
}

/// All consents recorded for one subject, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectConsents {
    pub subject: String,
    pub consents: Vec<Consent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn draft() -> ConsentDraft {
        ConsentDraft {
            tenant_id: TenantId::new("acme"),
            subject: "user-42".to_string(),
            policy_slug: "privacy".to_string(),
            policy_version: "1.0".to_string(),
            method: AcceptanceMethod::Direct,
            link_token: None,
            capture: None,
        }
    }

    fn revocation(by: &str) -> Revocation {
        Revocation {
            revoked_at: now() + Duration::days(3),
            revoked_by: by.to_string(),
        }
    }

    #[test]
    fn record_starts_active() {
        let consent = Consent::record(ConsentId::generate(), draft(), now()).expect("valid");
        assert!(consent.is_active());
        assert_eq!(consent.accepted_at, now());
        assert_eq!(consent.acceptance_method, AcceptanceMethod::Direct);
        assert!(consent.revocation().is_none());
    }

    #[test]
    fn record_validates_required_fields() {
        let mut blank_subject = draft();
        blank_subject.subject = String::new();
        assert_eq!(
            Consent::record(ConsentId::generate(), blank_subject, now()),
            Err(DomainError::InvalidSubject)
        );

        let mut blank_slug = draft();
        blank_slug.policy_slug = String::new();
        assert_eq!(
            Consent::record(ConsentId::generate(), blank_slug, now()),
            Err(DomainError::InvalidSlug)
        );

        let mut blank_version = draft();
        blank_version.policy_version = String::new();
        assert!(matches!(
            Consent::record(ConsentId::generate(), blank_version, now()),
            Err(DomainError::InvalidVersion { .. })
        ));

        let mut blank_tenant = draft();
        blank_tenant.tenant_id = TenantId::new(" ");
        assert_eq!(
            Consent::record(ConsentId::generate(), blank_tenant, now()),
            Err(DomainError::InvalidTenant)
        );
    }

    #[test]
    fn link_acceptance_carries_its_token() {
        let mut via_link = draft();
        via_link.method = AcceptanceMethod::Link;
        assert!(matches!(
            Consent::record(ConsentId::generate(), via_link.clone(), now()),
            Err(DomainError::InvalidRequest(_))
        ));

        via_link.link_token = Some(LinkToken("tok-1".to_string()));
        let consent = Consent::record(ConsentId::generate(), via_link, now()).expect("valid");
        assert_eq!(consent.link_token, Some(LinkToken("tok-1".to_string())));
    }

    #[test]
    fn empty_capture_context_is_dropped() {
        let mut with_capture = draft();
        with_capture.capture = Some(CaptureContext::default());
        let consent = Consent::record(ConsentId::generate(), with_capture, now()).expect("valid");
        assert!(consent.capture.is_none());
    }

    #[test]
    fn revoke_is_terminal() {
        let mut consent = Consent::record(ConsentId::generate(), draft(), now()).expect("valid");
        consent.revoke(revocation("dpo@acme")).expect("first revoke");
        assert!(!consent.is_active());

        assert_eq!(
            consent.revoke(revocation("someone-else")),
            Err(DomainError::ConsentAlreadyRevoked)
        );
        let recorded = consent.revocation().expect("revoked");
        assert_eq!(recorded.revoked_by, "dpo@acme");
    }

    #[test]
    fn serialized_form_flattens_state() {
        let mut consent = Consent::record(ConsentId("c-1".to_string()), draft(), now())
            .expect("valid");
        let active = serde_json::to_value(&consent).expect("serializes");
        assert_eq!(active["status"], "active");
        assert!(active.get("link_token").is_none());

        consent.revoke(revocation("dpo@acme")).expect("revoke");
        let revoked = serde_json::to_value(&consent).expect("serializes");
        assert_eq!(revoked["status"], "revoked");
        assert_eq!(revoked["revoked_by"], "dpo@acme");

        let restored: Consent = serde_json::from_value(revoked).expect("deserializes");
        assert_eq!(restored, consent);
    }
}
