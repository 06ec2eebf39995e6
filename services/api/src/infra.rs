use consent_ledger::consent::{
    ConsentApi, ConsentService, InMemoryConsentLinkRepository, InMemoryConsentRepository,
    InMemoryPolicyRepository, LinkService, LinkSettings, PolicyService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type MemoryConsentApi =
    ConsentApi<InMemoryPolicyRepository, InMemoryConsentRepository, InMemoryConsentLinkRepository>;

/// In-memory stores shared by the three services.
#[derive(Default, Clone)]
pub(crate) struct MemoryStores {
    pub(crate) policies: Arc<InMemoryPolicyRepository>,
    pub(crate) consents: Arc<InMemoryConsentRepository>,
    pub(crate) links: Arc<InMemoryConsentLinkRepository>,
}

impl MemoryStores {
    pub(crate) fn api(&self, settings: LinkSettings) -> MemoryConsentApi {
        ConsentApi::new(
            PolicyService::new(self.policies.clone()),
            ConsentService::new(self.consents.clone(), self.policies.clone()),
            LinkService::new(self.links.clone(), self.policies.clone(), settings),
        )
    }
}
