use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    AcceptanceMethod, CaptureContext, Consent, ConsentId, ErrorKind, LinkToken, NewPolicyVersion,
    TenantId,
};
use super::repository::{
    ConsentLinkRepository, ConsentRepository, PolicyRepository, RepositoryError,
};
use super::service::{
    ConsentService, CreateConsentRequest, CreateLinkRequest, CreatePolicyRequest, LinkService,
    PolicyService, ServiceError,
};

pub const TENANT_HEADER: &str = "x-tenant-id";

/// The three orchestration services sharing one set of stores.
pub struct ConsentApi<P, C, L> {
    pub policies: PolicyService<P>,
    pub consents: ConsentService<C, P>,
    pub links: LinkService<L, P>,
}

impl<P, C, L> ConsentApi<P, C, L>
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    pub fn new(
        policies: PolicyService<P>,
        consents: ConsentService<C, P>,
        links: LinkService<L, P>,
    ) -> Self {
        Self {
            policies,
            consents,
            links,
        }
    }

    /// Record the subject's consent through a link.
    ///
    /// Every referenced policy must still resolve to an active version before the link is
    /// consumed, so a link whose policies drifted stays usable once they are fixed. The store's
    /// conditional `mark_used` remains the single point deciding who consumes the link.
    pub fn accept_link(
        &self,
        token: &LinkToken,
        capture: Option<CaptureContext>,
    ) -> Result<Vec<Consent>, ServiceError> {
        self.links.get_link_info(token)?;
        let link = self.links.mark_link_as_used(token)?;
        self.consents.create_consents_from_link(&link, capture)
    }
}

type ApiState<P, C, L> = State<Arc<ConsentApi<P, C, L>>>;

/// Router builder exposing the tenant API under `/api/v1` and the link pages under `/public`.
pub fn consent_router<P, C, L>(api: Arc<ConsentApi<P, C, L>>) -> Router
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/policies",
            post(create_policy_handler::<P, C, L>).get(list_policies_handler::<P, C, L>),
        )
        .route("/api/v1/policies/:slug", get(get_policy_handler::<P, C, L>))
        .route(
            "/api/v1/policies/:slug/versions",
            post(add_version_handler::<P, C, L>),
        )
        .route(
            "/api/v1/policies/:slug/versions/active",
            get(active_version_handler::<P, C, L>),
        )
        .route(
            "/api/v1/policies/:slug/versions/:version",
            get(version_handler::<P, C, L>),
        )
        .route("/api/v1/consents", post(create_consents_handler::<P, C, L>))
        .route("/api/v1/consents/:id", get(consent_handler::<P, C, L>))
        .route(
            "/api/v1/consents/:id/revoke",
            post(revoke_consent_handler::<P, C, L>),
        )
        .route(
            "/api/v1/subjects/:subject/consents",
            get(subject_consents_handler::<P, C, L>),
        )
        .route(
            "/api/v1/subjects/:subject/consents/:slug",
            get(subject_policy_consent_handler::<P, C, L>),
        )
        .route(
            "/api/v1/subjects/:subject/status",
            get(consent_status_handler::<P, C, L>),
        )
        .route("/api/v1/links", post(create_link_handler::<P, C, L>))
        .route(
            "/api/v1/links/:token",
            get(get_link_handler::<P, C, L>).delete(invalidate_link_handler::<P, C, L>),
        )
        .route("/public/links/:token", get(link_info_handler::<P, C, L>))
        .route(
            "/public/links/:token/consents",
            post(link_consents_handler::<P, C, L>),
        )
        .with_state(api)
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ServiceError::Domain(err) => {
                let kind = err.kind();
                let status = match kind {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::Expired => StatusCode::GONE,
                    ErrorKind::State => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, kind.label())
            }
            ServiceError::Repository(RepositoryError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            ServiceError::Repository(RepositoryError::Conflict) => (StatusCode::CONFLICT, "conflict"),
            ServiceError::Repository(RepositoryError::NotFound) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "consent request failed");
        }
        let payload = json!({
            "error": self.to_string(),
            "kind": kind,
        });
        (status, Json(payload)).into_response()
    }
}

fn tenant_from(headers: &HeaderMap) -> Result<TenantId, Response> {
    let tenant = headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match tenant {
        Some(value) => Ok(TenantId::new(value)),
        None => {
            let payload = json!({
                "error": "missing X-Tenant-ID header",
                "kind": "validation",
            });
            Err((StatusCode::BAD_REQUEST, Json(payload)).into_response())
        }
    }
}

/// Request metadata for link submissions that do not carry their own.
fn capture_from(headers: &HeaderMap) -> Option<CaptureContext> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let capture = CaptureContext {
        ip_address: header("x-forwarded-for")
            .and_then(|forwarded| forwarded.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
        user_agent: header("user-agent"),
    };
    (!capture.is_empty()).then_some(capture)
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

macro_rules! tenant_or_return {
    ($headers:expr) => {
        match tenant_from(&$headers) {
            Ok(tenant) => tenant,
            Err(response) => return response,
        }
    };
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ActiveFilter {
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusQuery {
    #[serde(default)]
    policies: Option<String>,
}

impl StatusQuery {
    fn slugs(&self) -> Vec<String> {
        self.policies
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevokeConsentBody {
    revoked_by: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LinkSubmissionBody {
    #[serde(default)]
    capture: Option<CaptureContext>,
}

pub(crate) async fn create_policy_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Json(request): Json<CreatePolicyRequest>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::CREATED, api.policies.create_policy(&tenant, request))
}

pub(crate) async fn list_policies_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Query(filter): Query<ActiveFilter>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    let result = if filter.active {
        api.policies.list_active_policies(&tenant)
    } else {
        api.policies.list_policies(&tenant)
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn get_policy_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::OK, api.policies.get_policy(&tenant, &slug))
}

pub(crate) async fn add_version_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(spec): Json<NewPolicyVersion>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::CREATED, api.policies.add_version(&tenant, &slug, spec))
}

pub(crate) async fn active_version_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::OK, api.policies.active_version(&tenant, &slug))
}

pub(crate) async fn version_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path((slug, version)): Path<(String, String)>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::OK, api.policies.version(&tenant, &slug, &version))
}

pub(crate) async fn create_consents_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Json(request): Json<CreateConsentRequest>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    let result = api
        .consents
        .create_consents(&tenant, request, AcceptanceMethod::Direct, None);
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn consent_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::OK, api.consents.consent_by_id(&tenant, &ConsentId(id)))
}

pub(crate) async fn revoke_consent_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RevokeConsentBody>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    let result = api
        .consents
        .revoke_consent(&tenant, &ConsentId(id), &body.revoked_by);
    respond(StatusCode::OK, result)
}

pub(crate) async fn subject_consents_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(subject): Path<String>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::OK, api.consents.consents_by_subject(&tenant, &subject))
}

pub(crate) async fn subject_policy_consent_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path((subject, slug)): Path<(String, String)>,
    Query(filter): Query<ActiveFilter>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    let result = if filter.active {
        api.consents
            .active_consent_by_subject_and_policy(&tenant, &subject, &slug)
    } else {
        api.consents
            .consent_by_subject_and_policy(&tenant, &subject, &slug)
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn consent_status_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(subject): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    let result = api
        .consents
        .consent_status(&tenant, &subject, &query.slugs())
        .map(|policies| json!({ "subject": subject, "policies": policies }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn create_link_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Json(request): Json<CreateLinkRequest>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(StatusCode::CREATED, api.links.create_link(&tenant, request))
}

pub(crate) async fn get_link_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    respond(
        StatusCode::OK,
        api.links.get_tenant_link(&tenant, &LinkToken(token)),
    )
}

pub(crate) async fn invalidate_link_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let tenant = tenant_or_return!(headers);
    let token = LinkToken(token);
    let result = api
        .links
        .get_tenant_link(&tenant, &token)
        .and_then(|_| api.links.invalidate_link(&token));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn link_info_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    Path(token): Path<String>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    respond(StatusCode::OK, api.links.get_link_info(&LinkToken(token)))
}

pub(crate) async fn link_consents_handler<P, C, L>(
    State(api): ApiState<P, C, L>,
    headers: HeaderMap,
    Path(token): Path<String>,
    body: Option<Json<LinkSubmissionBody>>,
) -> Response
where
    P: PolicyRepository + 'static,
    C: ConsentRepository + 'static,
    L: ConsentLinkRepository + 'static,
{
    let capture = body
        .and_then(|Json(body)| body.capture)
        .filter(|capture| !capture.is_empty())
        .or_else(|| capture_from(&headers));
    respond(
        StatusCode::CREATED,
        api.accept_link(&LinkToken(token), capture),
    )
}
