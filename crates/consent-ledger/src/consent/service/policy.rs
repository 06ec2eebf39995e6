use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{load_policy, require_tenant, ServiceError};
use crate::consent::domain::{DomainError, NewPolicyVersion, Policy, PolicyVersion, TenantId};
use crate::consent::repository::{PolicyRepository, RepositoryError};

const MAX_SLUG_LEN: usize = 100;
const MAX_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_VERSION_LABEL_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePolicyRequest {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CreatePolicyRequest {
    fn validate(&self) -> Result<(), DomainError> {
        if self.slug.trim().is_empty() {
            return Err(DomainError::InvalidSlug);
        }
        if self.slug.chars().count() > MAX_SLUG_LEN {
            return Err(DomainError::InvalidRequest(format!(
                "slug must be at most {MAX_SLUG_LEN} characters"
            )));
        }
        let name_len = self.name.trim().chars().count();
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(DomainError::InvalidRequest(format!(
                "name must be between 1 and {MAX_NAME_LEN} characters"
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(DomainError::InvalidRequest(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        Ok(())
    }
}

fn validate_version_label(spec: &NewPolicyVersion) -> Result<(), DomainError> {
    if spec.version.chars().count() > MAX_VERSION_LABEL_LEN {
        return Err(DomainError::InvalidVersion {
            version: spec.version.clone(),
        });
    }
    Ok(())
}

/// Policy administration: creation, version publication, and read access.
pub struct PolicyService<P> {
    repository: Arc<P>,
}

impl<P> PolicyService<P>
where
    P: PolicyRepository + 'static,
{
    pub fn new(repository: Arc<P>) -> Self {
        Self { repository }
    }

    /// Create an empty policy. The existence pre-check is advisory; a concurrent create is
    /// caught by the store's uniqueness constraint and reported the same way.
    pub fn create_policy(
        &self,
        tenant: &TenantId,
        request: CreatePolicyRequest,
    ) -> Result<Policy, ServiceError> {
        require_tenant(tenant)?;
        request.validate()?;

        if self.repository.find_by_slug(tenant, &request.slug)?.is_some() {
            return Err(DomainError::PolicyAlreadyExists { slug: request.slug }.into());
        }

        let CreatePolicyRequest {
            slug,
            name,
            description,
        } = request;
        let policy = Policy::new(tenant.clone(), slug.clone(), name, description, Utc::now())?;

        let stored = self.repository.insert(policy).map_err(|err| match err {
            RepositoryError::Conflict => ServiceError::from(DomainError::PolicyAlreadyExists { slug }),
            other => ServiceError::from(other),
        })?;

        info!(tenant = %stored.tenant_id, slug = %stored.slug, "policy created");
        Ok(stored)
    }

    /// Append a version and persist the whole aggregate.
    pub fn add_version(
        &self,
        tenant: &TenantId,
        slug: &str,
        spec: NewPolicyVersion,
    ) -> Result<Policy, ServiceError> {
        require_tenant(tenant)?;
        let mut policy = load_policy(self.repository.as_ref(), tenant, slug)?;
        validate_version_label(&spec)?;

        let (label, activated) = {
            let version = policy.add_version(spec, Utc::now())?;
            (version.version.clone(), version.is_active)
        };

        let stored = self.repository.replace(policy)?;
        info!(
            tenant = %tenant,
            slug = %slug,
            version = %label,
            activated,
            "policy version added"
        );
        Ok(stored)
    }

    pub fn get_policy(&self, tenant: &TenantId, slug: &str) -> Result<Policy, ServiceError> {
        require_tenant(tenant)?;
        load_policy(self.repository.as_ref(), tenant, slug)
    }

    pub fn list_policies(&self, tenant: &TenantId) -> Result<Vec<Policy>, ServiceError> {
        require_tenant(tenant)?;
        Ok(self.repository.find_all(tenant)?)
    }

    /// Policies with an active version; the filtering happens in the store.
    pub fn list_active_policies(&self, tenant: &TenantId) -> Result<Vec<Policy>, ServiceError> {
        require_tenant(tenant)?;
        Ok(self.repository.find_all_active(tenant)?)
    }

    pub fn active_version(
        &self,
        tenant: &TenantId,
        slug: &str,
    ) -> Result<PolicyVersion, ServiceError> {
        let policy = self.get_policy(tenant, slug)?;
        let active = policy.active_version()?;
        Ok(active.clone())
    }

    pub fn version(
        &self,
        tenant: &TenantId,
        slug: &str,
        label: &str,
    ) -> Result<PolicyVersion, ServiceError> {
        let policy = self.get_policy(tenant, slug)?;
        let version = policy.version(label)?;
        Ok(version.clone())
    }
}
