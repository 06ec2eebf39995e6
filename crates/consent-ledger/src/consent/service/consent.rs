use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{load_policy, require_subject, require_tenant, ServiceError};
use crate::consent::domain::{
    compute_status, AcceptanceMethod, CaptureContext, Consent, ConsentDraft, ConsentId,
    ConsentLink, DomainError, LinkToken, Policy, PolicyConsentStatus, Revocation,
    SubjectConsents, TenantId,
};
use crate::consent::repository::{ConsentRepository, PolicyRepository, RepositoryError};

/// One policy to consent to; without a version (or with a blank one) the policy's active
/// version is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySelection {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PolicySelection {
    pub fn current(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            version: None,
        }
    }

    pub fn pinned(slug: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            version: Some(version.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConsentRequest {
    pub subject: String,
    pub policies: Vec<PolicySelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureContext>,
}

/// Consent orchestration: recording, lookup, revocation, and status reconciliation.
pub struct ConsentService<C, P> {
    consents: Arc<C>,
    policies: Arc<P>,
}

impl<C, P> ConsentService<C, P>
where
    C: ConsentRepository + 'static,
    P: PolicyRepository + 'static,
{
    pub fn new(consents: Arc<C>, policies: Arc<P>) -> Self {
        Self { consents, policies }
    }

    /// Record consent to each requested policy, in request order.
    ///
    /// Every policy and version is resolved before anything is written, so an unknown policy
    /// or version rejects the whole request. Re-consenting to the version a subject already
    /// actively holds reuses that record. A storage failure part-way leaves the records
    /// written so far in place.
    pub fn create_consents(
        &self,
        tenant: &TenantId,
        request: CreateConsentRequest,
        method: AcceptanceMethod,
        link_token: Option<LinkToken>,
    ) -> Result<Vec<Consent>, ServiceError> {
        require_tenant(tenant)?;
        require_subject(&request.subject)?;
        if request.policies.is_empty() {
            return Err(DomainError::InvalidRequest(
                "at least one policy is required".to_string(),
            )
            .into());
        }

        let resolved = request
            .policies
            .iter()
            .map(|selection| self.resolve_version(tenant, selection))
            .collect::<Result<Vec<_>, _>>()?;

        let mut recorded = Vec::with_capacity(resolved.len());
        for (slug, version) in resolved {
            let existing =
                self.consents
                    .find_active_by_subject_and_policy(tenant, &request.subject, &slug)?;
            if let Some(existing) = existing.filter(|c| c.policy_version == version) {
                debug!(
                    tenant = %tenant,
                    subject = %request.subject,
                    slug = %slug,
                    version = %version,
                    "consent already recorded for version"
                );
                recorded.push(existing);
                continue;
            }

            let consent = Consent::record(
                ConsentId::generate(),
                ConsentDraft {
                    tenant_id: tenant.clone(),
                    subject: request.subject.clone(),
                    policy_slug: slug,
                    policy_version: version,
                    method,
                    link_token: link_token.clone(),
                    capture: request.capture.clone(),
                },
                Utc::now(),
            )?;
            let stored = self.consents.insert(consent)?;
            info!(
                tenant = %tenant,
                subject = %stored.subject,
                slug = %stored.policy_slug,
                version = %stored.policy_version,
                method = stored.acceptance_method.label(),
                "consent recorded"
            );
            recorded.push(stored);
        }

        Ok(recorded)
    }

    /// Consent to every policy of an already consumed link at its current active version.
    pub fn create_consents_from_link(
        &self,
        link: &ConsentLink,
        capture: Option<CaptureContext>,
    ) -> Result<Vec<Consent>, ServiceError> {
        let request = CreateConsentRequest {
            subject: link.subject.clone(),
            policies: link
                .policies
                .iter()
                .map(|slug| PolicySelection::current(slug.clone()))
                .collect(),
            capture,
        };
        self.create_consents(
            &link.tenant_id,
            request,
            AcceptanceMethod::Link,
            Some(link.token.clone()),
        )
    }

    pub fn consents_by_subject(
        &self,
        tenant: &TenantId,
        subject: &str,
    ) -> Result<SubjectConsents, ServiceError> {
        require_tenant(tenant)?;
        require_subject(subject)?;
        let consents = self.consents.find_by_subject(tenant, subject)?;
        Ok(SubjectConsents {
            subject: subject.to_string(),
            consents,
        })
    }

    /// Most recent consent for the policy, revoked or not.
    pub fn consent_by_subject_and_policy(
        &self,
        tenant: &TenantId,
        subject: &str,
        slug: &str,
    ) -> Result<Consent, ServiceError> {
        require_tenant(tenant)?;
        require_subject(subject)?;
        self.consents
            .find_latest_by_subject_and_policy(tenant, subject, slug)?
            .ok_or_else(|| subject_consent_not_found(subject, slug))
    }

    /// Most recent non-revoked consent for the policy.
    pub fn active_consent_by_subject_and_policy(
        &self,
        tenant: &TenantId,
        subject: &str,
        slug: &str,
    ) -> Result<Consent, ServiceError> {
        require_tenant(tenant)?;
        require_subject(subject)?;
        self.consents
            .find_active_by_subject_and_policy(tenant, subject, slug)?
            .ok_or_else(|| subject_consent_not_found(subject, slug))
    }

    pub fn consent_by_id(&self, tenant: &TenantId, id: &ConsentId) -> Result<Consent, ServiceError> {
        require_tenant(tenant)?;
        self.consents
            .find_by_id(tenant, id)?
            .ok_or_else(|| consent_not_found(id))
    }

    /// Revoke a consent. The store's conditional update decides between racing revokers.
    pub fn revoke_consent(
        &self,
        tenant: &TenantId,
        id: &ConsentId,
        revoked_by: &str,
    ) -> Result<Consent, ServiceError> {
        require_tenant(tenant)?;
        if revoked_by.trim().is_empty() {
            return Err(DomainError::InvalidRequest("revoked_by is required".to_string()).into());
        }

        let current = self
            .consents
            .find_by_id(tenant, id)?
            .ok_or_else(|| consent_not_found(id))?;
        if !current.is_active() {
            return Err(DomainError::ConsentAlreadyRevoked.into());
        }

        let revocation = Revocation {
            revoked_at: Utc::now(),
            revoked_by: revoked_by.to_string(),
        };
        let revoked = self
            .consents
            .revoke(tenant, id, revocation)
            .map_err(|err| match err {
                RepositoryError::Conflict => ServiceError::from(DomainError::ConsentAlreadyRevoked),
                RepositoryError::NotFound => consent_not_found(id),
                other => ServiceError::from(other),
            })?;

        info!(
            tenant = %tenant,
            consent = %revoked.id,
            slug = %revoked.policy_slug,
            revoked_by,
            "consent revoked"
        );
        Ok(revoked)
    }

    /// Status of the subject against each policy.
    ///
    /// With no slugs, every policy holding an active version is evaluated. Requested slugs must
    /// all exist; a requested policy without an active version is left out of the result.
    pub fn consent_status(
        &self,
        tenant: &TenantId,
        subject: &str,
        slugs: &[String],
    ) -> Result<Vec<PolicyConsentStatus>, ServiceError> {
        require_tenant(tenant)?;
        require_subject(subject)?;

        let ordered: Vec<Policy> = if slugs.is_empty() {
            self.policies.find_all_active(tenant)?
        } else {
            let found = self.policies.find_by_slugs(tenant, slugs)?;
            let mut by_slug: HashMap<String, Policy> = found
                .into_iter()
                .map(|policy| (policy.slug.clone(), policy))
                .collect();

            let mut seen = HashSet::new();
            let requested: Vec<&String> = slugs
                .iter()
                .filter(|slug| seen.insert(slug.as_str()))
                .collect();
            let missing: Vec<String> = requested
                .iter()
                .filter(|slug| !by_slug.contains_key(slug.as_str()))
                .map(|slug| (*slug).clone())
                .collect();
            if !missing.is_empty() {
                return Err(DomainError::PoliciesNotFound { slugs: missing }.into());
            }

            requested
                .into_iter()
                .filter_map(|slug| by_slug.remove(slug.as_str()))
                .collect()
        };

        let policy_slugs: Vec<String> = ordered.iter().map(|p| p.slug.clone()).collect();
        let active_consents =
            self.consents
                .find_active_by_subject_and_policies(tenant, subject, &policy_slugs)?;

        let mut latest: HashMap<&str, &Consent> = HashMap::new();
        for consent in &active_consents {
            latest.entry(consent.policy_slug.as_str()).or_insert(consent);
        }

        let statuses = ordered
            .iter()
            .filter_map(|policy| {
                let active = policy.active_version().ok()?;
                let consent = latest.get(policy.slug.as_str()).copied();
                Some(compute_status(policy, active, consent))
            })
            .collect();

        Ok(statuses)
    }

    fn resolve_version(
        &self,
        tenant: &TenantId,
        selection: &PolicySelection,
    ) -> Result<(String, String), ServiceError> {
        let policy = load_policy(self.policies.as_ref(), tenant, &selection.slug)?;
        let pinned = selection
            .version
            .as_deref()
            .filter(|label| !label.trim().is_empty());
        let version = match pinned {
            Some(label) => policy.version(label)?.version.clone(),
            None => policy.active_version()?.version.clone(),
        };
        Ok((policy.slug, version))
    }
}

fn consent_not_found(id: &ConsentId) -> ServiceError {
    DomainError::ConsentNotFound { id: id.to_string() }.into()
}

fn subject_consent_not_found(subject: &str, slug: &str) -> ServiceError {
    DomainError::SubjectConsentNotFound {
        subject: subject.to_string(),
        slug: slug.to_string(),
    }
    .into()
}
