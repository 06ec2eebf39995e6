//! Mutex-guarded in-memory stores. Each conditional update runs entirely under the lock, which
//! gives the compare-and-swap semantics the repository contracts require.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Consent, ConsentId, ConsentLink, LinkToken, Policy, Revocation, TenantId,
};
use super::repository::{
    ConsentLinkRepository, ConsentRepository, PolicyRepository, RepositoryError,
};

fn lock<'a, T>(mutex: &'a Mutex<T>, store: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{store} store lock poisoned")))
}

#[derive(Default, Clone)]
pub struct InMemoryPolicyRepository {
    policies: Arc<Mutex<Vec<Policy>>>,
}

impl PolicyRepository for InMemoryPolicyRepository {
    fn find_by_slug(&self, tenant: &TenantId, slug: &str) -> Result<Option<Policy>, RepositoryError> {
        let guard = lock(&self.policies, "policy")?;
        Ok(guard
            .iter()
            .find(|p| &p.tenant_id == tenant && p.slug == slug)
            .cloned())
    }

    fn find_by_slugs(
        &self,
        tenant: &TenantId,
        slugs: &[String],
    ) -> Result<Vec<Policy>, RepositoryError> {
        let guard = lock(&self.policies, "policy")?;
        Ok(guard
            .iter()
            .filter(|p| &p.tenant_id == tenant && slugs.contains(&p.slug))
            .cloned()
            .collect())
    }

    fn find_all(&self, tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError> {
        let guard = lock(&self.policies, "policy")?;
        Ok(guard
            .iter()
            .filter(|p| &p.tenant_id == tenant)
            .cloned()
            .collect())
    }

    fn find_all_active(&self, tenant: &TenantId) -> Result<Vec<Policy>, RepositoryError> {
        let guard = lock(&self.policies, "policy")?;
        Ok(guard
            .iter()
            .filter(|p| &p.tenant_id == tenant && p.has_active_version())
            .cloned()
            .collect())
    }

    fn insert(&self, policy: Policy) -> Result<Policy, RepositoryError> {
        let mut guard = lock(&self.policies, "policy")?;
        if guard
            .iter()
            .any(|p| p.tenant_id == policy.tenant_id && p.slug == policy.slug)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.push(policy.clone());
        Ok(policy)
    }

    fn replace(&self, mut policy: Policy) -> Result<Policy, RepositoryError> {
        let mut guard = lock(&self.policies, "policy")?;
        let stored = guard
            .iter_mut()
            .find(|p| p.tenant_id == policy.tenant_id && p.slug == policy.slug)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision() != policy.revision() {
            return Err(RepositoryError::Conflict);
        }
        policy.advance_revision();
        *stored = policy.clone();
        Ok(policy)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryConsentRepository {
    consents: Arc<Mutex<Vec<Consent>>>,
}

impl InMemoryConsentRepository {
    /// Most-recent-first; among equal timestamps the later insert wins.
    fn collect<F>(&self, mut predicate: F) -> Result<Vec<Consent>, RepositoryError>
    where
        F: FnMut(&Consent) -> bool,
    {
        let guard = lock(&self.consents, "consent")?;
        let mut matches: Vec<Consent> = guard
            .iter()
            .rev()
            .filter(|c| predicate(*c))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.accepted_at.cmp(&a.accepted_at));
        Ok(matches)
    }

    pub fn len(&self) -> Result<usize, RepositoryError> {
        Ok(lock(&self.consents, "consent")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.len()? == 0)
    }
}

impl ConsentRepository for InMemoryConsentRepository {
    fn find_by_id(
        &self,
        tenant: &TenantId,
        id: &ConsentId,
    ) -> Result<Option<Consent>, RepositoryError> {
        let guard = lock(&self.consents, "consent")?;
        Ok(guard
            .iter()
            .find(|c| &c.tenant_id == tenant && &c.id == id)
            .cloned())
    }

    fn find_by_subject(
        &self,
        tenant: &TenantId,
        subject: &str,
    ) -> Result<Vec<Consent>, RepositoryError> {
        self.collect(|c| &c.tenant_id == tenant && c.subject == subject)
    }

    fn find_latest_by_subject_and_policy(
        &self,
        tenant: &TenantId,
        subject: &str,
        slug: &str,
    ) -> Result<Option<Consent>, RepositoryError> {
        let matches =
            self.collect(|c| &c.tenant_id == tenant && c.subject == subject && c.policy_slug == slug)?;
        Ok(matches.into_iter().next())
    }

    fn find_active_by_subject_and_policy(
        &self,
        tenant: &TenantId,
        subject: &str,
        slug: &str,
    ) -> Result<Option<Consent>, RepositoryError> {
        let matches = self.collect(|c| {
            &c.tenant_id == tenant && c.subject == subject && c.policy_slug == slug && c.is_active()
        })?;
        Ok(matches.into_iter().next())
    }

    fn find_active_by_subject_and_policies(
        &self,
        tenant: &TenantId,
        subject: &str,
        slugs: &[String],
    ) -> Result<Vec<Consent>, RepositoryError> {
        self.collect(|c| {
            &c.tenant_id == tenant
                && c.subject == subject
                && c.is_active()
                && slugs.contains(&c.policy_slug)
        })
    }

    fn insert(&self, consent: Consent) -> Result<Consent, RepositoryError> {
        let mut guard = lock(&self.consents, "consent")?;
        if guard.iter().any(|c| c.id == consent.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(consent.clone());
        Ok(consent)
    }

    fn revoke(
        &self,
        tenant: &TenantId,
        id: &ConsentId,
        revocation: Revocation,
    ) -> Result<Consent, RepositoryError> {
        let mut guard = lock(&self.consents, "consent")?;
        let stored = guard
            .iter_mut()
            .find(|c| &c.tenant_id == tenant && &c.id == id)
            .ok_or(RepositoryError::NotFound)?;
        stored
            .revoke(revocation)
            .map_err(|_| RepositoryError::Conflict)?;
        Ok(stored.clone())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryConsentLinkRepository {
    links: Arc<Mutex<HashMap<LinkToken, ConsentLink>>>,
}

impl InMemoryConsentLinkRepository {
    pub fn len(&self) -> Result<usize, RepositoryError> {
        Ok(lock(&self.links, "link")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.len()? == 0)
    }
}

impl ConsentLinkRepository for InMemoryConsentLinkRepository {
    fn find_by_token(&self, token: &LinkToken) -> Result<Option<ConsentLink>, RepositoryError> {
        let guard = lock(&self.links, "link")?;
        Ok(guard.get(token).cloned())
    }

    fn insert(&self, link: ConsentLink) -> Result<ConsentLink, RepositoryError> {
        let mut guard = lock(&self.links, "link")?;
        if guard.contains_key(&link.token) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(link.token.clone(), link.clone());
        Ok(link)
    }

    fn mark_used(
        &self,
        token: &LinkToken,
        used_at: DateTime<Utc>,
    ) -> Result<ConsentLink, RepositoryError> {
        let mut guard = lock(&self.links, "link")?;
        let stored = guard.get_mut(token).ok_or(RepositoryError::NotFound)?;
        stored
            .mark_used(used_at)
            .map_err(|_| RepositoryError::Conflict)?;
        Ok(stored.clone())
    }

    fn delete(&self, token: &LinkToken) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.links, "link")?;
        guard
            .remove(token)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut guard = lock(&self.links, "link")?;
        let before = guard.len();
        guard.retain(|_, link| link.expires_at >= now);
        Ok(before - guard.len())
    }
}
