use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{load_policy, require_subject, require_tenant, ServiceError};
pub use crate::consent::domain::{MAX_LINK_EXPIRY_HOURS, MIN_LINK_EXPIRY_HOURS};
use crate::consent::domain::{
    ConsentLink, DomainError, LinkDraft, LinkStatus, LinkToken, TenantId,
};
use crate::consent::repository::{ConsentLinkRepository, PolicyRepository, RepositoryError};

/// Deployment settings handed to [`LinkService`] at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Public origin the consent pages are served from, without a trailing slash.
    pub base_url: String,
    pub default_expiry_hours: u32,
}

impl LinkSettings {
    pub fn new(base_url: impl Into<String>, default_expiry_hours: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_expiry_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub subject: String,
    pub policies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_hours: Option<u32>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedLink {
    pub token: LinkToken,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Policy metadata flattened together with its active version's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkPolicyInfo {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub content_html: String,
    pub content_markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

/// What a subject sees when opening a valid link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkInfo {
    pub token: LinkToken,
    pub subject: String,
    pub policies: Vec<LinkPolicyInfo>,
    pub expires_at: DateTime<Utc>,
}

/// Issues, presents and consumes single-use consent links.
pub struct LinkService<L, P> {
    links: Arc<L>,
    policies: Arc<P>,
    settings: LinkSettings,
}

impl<L, P> LinkService<L, P>
where
    L: ConsentLinkRepository + 'static,
    P: PolicyRepository + 'static,
{
    pub fn new(links: Arc<L>, policies: Arc<P>, settings: LinkSettings) -> Self {
        Self {
            links,
            policies,
            settings,
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn public_url(&self, token: &LinkToken) -> String {
        format!("{}/public/links/{}", self.settings.base_url, token)
    }

    /// Issue a link. Every referenced policy must currently be consentable.
    pub fn create_link(
        &self,
        tenant: &TenantId,
        request: CreateLinkRequest,
    ) -> Result<CreatedLink, ServiceError> {
        require_tenant(tenant)?;
        require_subject(&request.subject)?;
        if request.policies.is_empty() {
            return Err(DomainError::InvalidRequest(
                "at least one policy is required".to_string(),
            )
            .into());
        }
        if request.created_by.trim().is_empty() {
            return Err(DomainError::InvalidRequest("created_by is required".to_string()).into());
        }
        let hours = request
            .expires_in_hours
            .unwrap_or(self.settings.default_expiry_hours);
        if !(MIN_LINK_EXPIRY_HOURS..=MAX_LINK_EXPIRY_HOURS).contains(&hours) {
            return Err(DomainError::InvalidExpiry {
                requested: hours,
                min: MIN_LINK_EXPIRY_HOURS,
                max: MAX_LINK_EXPIRY_HOURS,
            }
            .into());
        }

        for slug in &request.policies {
            let policy = load_policy(self.policies.as_ref(), tenant, slug)?;
            policy.active_version()?;
        }

        let link = ConsentLink::issue(
            LinkToken::generate(),
            LinkDraft {
                tenant_id: tenant.clone(),
                subject: request.subject,
                policies: request.policies,
                expires_in_hours: hours,
                created_by: request.created_by,
            },
            Utc::now(),
        )?;
        let stored = self.links.insert(link)?;

        info!(
            tenant = %tenant,
            subject = %stored.subject,
            token = %stored.token,
            policies = stored.policies.len(),
            expires_at = %stored.expires_at,
            "consent link issued"
        );
        Ok(CreatedLink {
            url: self.public_url(&stored.token),
            token: stored.token,
            expires_at: stored.expires_at,
        })
    }

    pub fn get_link(&self, token: &LinkToken) -> Result<ConsentLink, ServiceError> {
        self.links
            .find_by_token(token)?
            .ok_or_else(|| DomainError::LinkNotFound.into())
    }

    /// Link lookup restricted to one tenant; a link issued by another tenant is not found.
    pub fn get_tenant_link(
        &self,
        tenant: &TenantId,
        token: &LinkToken,
    ) -> Result<ConsentLink, ServiceError> {
        require_tenant(tenant)?;
        let link = self.get_link(token)?;
        if &link.tenant_id != tenant {
            return Err(DomainError::LinkNotFound.into());
        }
        Ok(link)
    }

    /// Validate the link and bundle the active content of each referenced policy.
    pub fn get_link_info(&self, token: &LinkToken) -> Result<LinkInfo, ServiceError> {
        let link = self.get_link(token)?;
        link.ensure_valid(Utc::now())?;

        let mut policies = Vec::with_capacity(link.policies.len());
        for slug in &link.policies {
            let policy = load_policy(self.policies.as_ref(), &link.tenant_id, slug)?;
            let active = policy.active_version().map_err(|_| DomainError::PolicyNotFound {
                slug: slug.clone(),
            })?;
            policies.push(LinkPolicyInfo {
                slug: policy.slug.clone(),
                name: policy.name.clone(),
                description: policy.description.clone(),
                version: active.version.clone(),
                content_html: active.content_html.clone(),
                content_markdown: active.content_markdown.clone(),
                pdf_url: active.pdf_url.clone(),
            });
        }

        Ok(LinkInfo {
            token: link.token,
            subject: link.subject,
            policies,
            expires_at: link.expires_at,
        })
    }

    pub fn invalidate_link(&self, token: &LinkToken) -> Result<(), ServiceError> {
        self.links.delete(token).map_err(|err| match err {
            RepositoryError::NotFound => ServiceError::from(DomainError::LinkNotFound),
            other => ServiceError::from(other),
        })?;
        info!(token = %token, "consent link invalidated");
        Ok(())
    }

    /// Consume the link. The in-memory check gives the precise error; the store's conditional
    /// update is what makes a concurrent second consumer lose.
    pub fn mark_link_as_used(&self, token: &LinkToken) -> Result<ConsentLink, ServiceError> {
        let now = Utc::now();
        let link = self.get_link(token)?;
        link.ensure_valid(now)?;

        match self.links.mark_used(token, now) {
            Ok(used) => {
                info!(tenant = %used.tenant_id, token = %token, "consent link consumed");
                Ok(used)
            }
            Err(RepositoryError::Conflict) => {
                warn!(token = %token, "consent link consumed concurrently");
                Err(self.classify_rejected(token, now))
            }
            Err(RepositoryError::NotFound) => Err(DomainError::LinkNotFound.into()),
            Err(other) => Err(other.into()),
        }
    }

    /// Remove links whose expiry lies before `now`.
    pub fn purge_expired_links(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let purged = self.links.purge_expired(now)?;
        if purged > 0 {
            info!(purged, "expired consent links purged");
        }
        Ok(purged)
    }

    fn classify_rejected(&self, token: &LinkToken, now: DateTime<Utc>) -> ServiceError {
        match self.links.find_by_token(token) {
            Ok(Some(current)) => match current.status(now) {
                LinkStatus::Expired { .. } => DomainError::LinkExpired.into(),
                LinkStatus::Used { .. } | LinkStatus::Valid => DomainError::LinkAlreadyUsed.into(),
            },
            Ok(None) => DomainError::LinkNotFound.into(),
            Err(err) => err.into(),
        }
    }
}
