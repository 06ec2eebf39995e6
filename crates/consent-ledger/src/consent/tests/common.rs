use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::consent::domain::{
    ConsentLink, LinkDraft, LinkToken, NewPolicyVersion, Policy, TenantId,
};
use crate::consent::memory::{
    InMemoryConsentLinkRepository, InMemoryConsentRepository, InMemoryPolicyRepository,
};
use crate::consent::repository::{ConsentLinkRepository, PolicyRepository, RepositoryError};
use crate::consent::service::{
    ConsentService, CreatePolicyRequest, LinkService, LinkSettings, PolicyService,
};
use crate::consent::{consent_router, ConsentApi};

pub(super) const BASE_URL: &str = "https://consent.example.com";

pub(super) fn tenant() -> TenantId {
    TenantId::new("acme")
}

pub(super) fn other_tenant() -> TenantId {
    TenantId::new("globex")
}

pub(super) fn settings() -> LinkSettings {
    LinkSettings::new(format!("{BASE_URL}/"), 48)
}

pub(super) fn policy_request(slug: &str) -> CreatePolicyRequest {
    CreatePolicyRequest {
        slug: slug.to_string(),
        name: format!("{slug} policy"),
        description: format!("How we handle {slug}"),
    }
}

pub(super) fn version(label: &str) -> NewPolicyVersion {
    NewPolicyVersion {
        content_html: format!("<p>{label}</p>"),
        content_markdown: format!("# {label}"),
        ..NewPolicyVersion::new(label)
    }
}

#[derive(Default, Clone)]
pub(super) struct Stores {
    pub(super) policies: Arc<InMemoryPolicyRepository>,
    pub(super) consents: Arc<InMemoryConsentRepository>,
    pub(super) links: Arc<InMemoryConsentLinkRepository>,
}

impl Stores {
    pub(super) fn policy_service(&self) -> PolicyService<InMemoryPolicyRepository> {
        PolicyService::new(self.policies.clone())
    }

    pub(super) fn consent_service(
        &self,
    ) -> ConsentService<InMemoryConsentRepository, InMemoryPolicyRepository> {
        ConsentService::new(self.consents.clone(), self.policies.clone())
    }

    pub(super) fn link_service(
        &self,
    ) -> LinkService<InMemoryConsentLinkRepository, InMemoryPolicyRepository> {
        LinkService::new(self.links.clone(), self.policies.clone(), settings())
    }

    pub(super) fn api(
        &self,
    ) -> ConsentApi<InMemoryPolicyRepository, InMemoryConsentRepository, InMemoryConsentLinkRepository>
    {
        ConsentApi::new(
            self.policy_service(),
            self.consent_service(),
            self.link_service(),
        )
    }

    pub(super) fn router(&self) -> axum::Router {
        consent_router(Arc::new(self.api()))
    }

    /// Create `slug` for the default tenant with the given versions; the last one is active.
    pub(super) fn publish(&self, slug: &str, labels: &[&str]) -> Policy {
        let service = self.policy_service();
        let mut policy = service
            .create_policy(&tenant(), policy_request(slug))
            .expect("policy created");
        for (index, label) in labels.iter().enumerate() {
            let mut spec = version(label);
            if index + 1 == labels.len() {
                spec = spec.active();
            }
            policy = service
                .add_version(&tenant(), slug, spec)
                .expect("version added");
        }
        policy
    }

    /// Store a link directly, issued at `issued_at`, bypassing the service's validation.
    pub(super) fn seed_link(
        &self,
        policies: &[&str],
        hours: u32,
        issued_at: DateTime<Utc>,
    ) -> ConsentLink {
        let link = ConsentLink::issue(
            LinkToken::generate(),
            LinkDraft {
                tenant_id: tenant(),
                subject: "user-42".to_string(),
                policies: policies.iter().map(|slug| slug.to_string()).collect(),
                expires_in_hours: hours,
                created_by: "crm-bot".to_string(),
            },
            issued_at,
        )
        .expect("valid link");
        self.links.insert(link).expect("link stored")
    }

    pub(super) fn seed_expired_link(&self, policies: &[&str]) -> ConsentLink {
        self.seed_link(policies, 1, Utc::now() - Duration::hours(3))
    }
}

pub(super) fn stores() -> Stores {
    Stores::default()
}

/// Policy store whose backend is down.
pub(super) struct UnavailablePolicyRepository;

impl PolicyRepository for UnavailablePolicyRepository {
    fn find_by_slug(
        &self,
        _tenant: &TenantId,
        _slug: &str,
    ) -> Result<Option<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_slugs(
        &self,
        _tenant: &TenantId,
        _slugs: &[String],
    ) -> Result<Vec<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_all(&self, _tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_all_active(&self, _tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert(&self, _policy: Policy) -> Result<Policy, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn replace(&self, _policy: Policy) -> Result<Policy, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Policy store that loses the race on every insert, as if another writer got there first.
#[derive(Default)]
pub(super) struct RacingPolicyRepository {
    pub(super) inner: InMemoryPolicyRepository,
}

impl PolicyRepository for RacingPolicyRepository {
    fn find_by_slug(&self, tenant: &TenantId, slug: &str) -> Result<Option<Policy>, RepositoryError> {
        self.inner.find_by_slug(tenant, slug)
    }

    fn find_by_slugs(
        &self,
        tenant: &TenantId,
        slugs: &[String],
    ) -> Result<Vec<Policy>, RepositoryError> {
        self.inner.find_by_slugs(tenant, slugs)
    }

    fn find_all(&self, tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError> {
        self.inner.find_all(tenant)
    }

    fn find_all_active(&self, tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError> {
        self.inner.find_all_active(tenant)
    }

    fn insert(&self, _policy: Policy) -> Result<Policy, RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn replace(&self, policy: Policy) -> Result<Policy, RepositoryError> {
        self.inner.replace(policy)
    }
}

/// Link store where a competing consumer always wins between the read and the conditional update.
#[derive(Default)]
pub(super) struct RacingLinkRepository {
    pub(super) inner: InMemoryConsentLinkRepository,
}

impl ConsentLinkRepository for RacingLinkRepository {
    fn find_by_token(&self, token: &LinkToken) -> Result<Option<ConsentLink>, RepositoryError> {
        self.inner.find_by_token(token)
    }

    fn insert(&self, link: ConsentLink) -> Result<ConsentLink, RepositoryError> {
        self.inner.insert(link)
    }

    fn mark_used(
        &self,
        token: &LinkToken,
        used_at: DateTime<Utc>,
    ) -> Result<ConsentLink, RepositoryError> {
        self.inner.mark_used(token, used_at)?;
        Err(RepositoryError::Conflict)
    }

    fn delete(&self, token: &LinkToken) -> Result<(), RepositoryError> {
        self.inner.delete(token)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.inner.purge_expired(now)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
