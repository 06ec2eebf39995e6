use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::consent::memory::{InMemoryConsentLinkRepository, InMemoryConsentRepository};
use crate::consent::repository::ConsentLinkRepository;
use crate::consent::router::{get_policy_handler, ConsentApi, TENANT_HEADER};
use crate::consent::service::{ConsentService, LinkService, PolicyService};

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(TENANT_HEADER, "acme")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header(TENANT_HEADER, "acme")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn missing_tenant_header_is_a_bad_request() {
    let router = stores().router();

    let response = router
        .oneshot(Request::get("/api/v1/policies").body(Body::empty()).unwrap())
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "validation");
}

#[tokio::test]
async fn policy_routes_create_and_publish() {
    let stores = stores();

    let response = stores
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/policies",
            json!({ "slug": "privacy", "name": "Privacy", "description": "Data use" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = stores
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/policies/privacy/versions",
            json!({ "version": "1.0", "content_markdown": "# v1", "is_active": true }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = stores
        .router()
        .oneshot(get("/api/v1/policies/privacy/versions/active"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["version"], "1.0");
    assert_eq!(payload["is_active"], true);

    let response = stores
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/policies",
            json!({ "slug": "privacy", "name": "Privacy again" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "conflict");
}

#[tokio::test]
async fn policy_listing_honours_active_filter() {
    let stores = stores();
    stores.publish("privacy", &["1.0"]);
    stores
        .policy_service()
        .create_policy(&tenant(), policy_request("drafting"))
        .expect("created");

    let all = read_json_body(
        stores
            .router()
            .oneshot(get("/api/v1/policies"))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let active = read_json_body(
        stores
            .router()
            .oneshot(get("/api/v1/policies?active=true"))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(active.as_array().map(Vec::len), Some(1));
    assert_eq!(active[0]["slug"], "privacy");
}

#[tokio::test]
async fn error_kinds_map_to_status_codes() {
    let stores = stores();
    stores
        .policy_service()
        .create_policy(&tenant(), policy_request("drafting"))
        .expect("created");

    let cases = [
        ("/api/v1/policies/ghost", StatusCode::NOT_FOUND),
        ("/api/v1/policies/drafting/versions/active", StatusCode::UNPROCESSABLE_ENTITY),
        ("/api/v1/policies/drafting/versions/9.9", StatusCode::BAD_REQUEST),
        ("/api/v1/consents/unknown", StatusCode::NOT_FOUND),
        ("/api/v1/subjects/user-42/status?policies=ghost", StatusCode::NOT_FOUND),
    ];
    for (uri, expected) in cases {
        let response = stores
            .router()
            .oneshot(get(uri))
            .await
            .expect("route executes");
        assert_eq!(response.status(), expected, "{uri}");
    }
}

#[tokio::test]
async fn storage_outage_maps_to_service_unavailable() {
    let policies = Arc::new(UnavailablePolicyRepository);
    let api = Arc::new(ConsentApi::new(
        PolicyService::new(policies.clone()),
        ConsentService::new(Arc::new(InMemoryConsentRepository::default()), policies.clone()),
        LinkService::new(
            Arc::new(InMemoryConsentLinkRepository::default()),
            policies,
            settings(),
        ),
    ));
    let mut headers = HeaderMap::new();
    headers.insert(TENANT_HEADER, "acme".parse().unwrap());

    let response = get_policy_handler::<
        UnavailablePolicyRepository,
        InMemoryConsentRepository,
        InMemoryConsentLinkRepository,
    >(State(api), headers, Path("privacy".to_string()))
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn consent_lifecycle_over_http() {
    let stores = stores();
    stores.publish("privacy", &["1.0"]);

    let response = stores
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/consents",
            json!({ "subject": "user-42", "policies": [{ "slug": "privacy" }] }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json_body(response).await;
    assert_eq!(created[0]["policy_version"], "1.0");
    assert_eq!(created[0]["acceptance_method"], "direct");
    assert_eq!(created[0]["status"], "active");
    let id = created[0]["id"].as_str().expect("id").to_string();

    let status = read_json_body(
        stores
            .router()
            .oneshot(get("/api/v1/subjects/user-42/status"))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(status["subject"], "user-42");
    assert_eq!(status["policies"][0]["status"], "accepted");

    let response = stores
        .router()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/consents/{id}/revoke"),
            json!({ "revoked_by": "user-42" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let revoked = read_json_body(response).await;
    assert_eq!(revoked["status"], "revoked");
    assert_eq!(revoked["revoked_by"], "user-42");

    let response = stores
        .router()
        .oneshot(get("/api/v1/subjects/user-42/consents/privacy?active=true"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = stores
        .router()
        .oneshot(get("/api/v1/subjects/user-42/consents/privacy"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let history = read_json_body(
        stores
            .router()
            .oneshot(get("/api/v1/subjects/user-42/consents"))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(history["consents"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn public_link_flow() {
    let stores = stores();
    stores.publish("privacy", &["1.0"]);

    let response = stores
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/links",
            json!({
                "subject": "user-42",
                "policies": ["privacy"],
                "expires_in_hours": 1,
                "created_by": "crm-bot"
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json_body(response).await;
    let token = created["token"].as_str().expect("token").to_string();
    assert_eq!(
        created["url"],
        format!("{BASE_URL}/public/links/{token}")
    );

    let info = stores
        .router()
        .oneshot(
            Request::get(format!("/public/links/{token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(info.status(), StatusCode::OK);
    let info = read_json_body(info).await;
    assert_eq!(info["policies"][0]["version"], "1.0");

    let submit = || {
        Request::post(format!("/public/links/{token}/consents"))
            .header(header::USER_AGENT, "Mozilla/5.0")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap()
    };
    let response = stores
        .router()
        .oneshot(submit())
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let consents = read_json_body(response).await;
    assert_eq!(consents[0]["acceptance_method"], "link");
    assert_eq!(consents[0]["link_token"], token.as_str());
    assert_eq!(consents[0]["capture"]["ip_address"], "203.0.113.9");
    assert_eq!(consents[0]["capture"]["user_agent"], "Mozilla/5.0");

    let response = stores
        .router()
        .oneshot(submit())
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(stores.consents.len(), Ok(1));
}

#[tokio::test]
async fn public_submission_for_a_drifted_link_keeps_it_open() {
    let stores = stores();
    stores.publish("privacy", &["1.0"]);
    stores
        .policy_service()
        .create_policy(&tenant(), policy_request("drafting"))
        .expect("created");
    let link = stores.seed_link(&["privacy", "drafting"], 2, chrono::Utc::now());

    let response = stores
        .router()
        .oneshot(
            Request::post(format!("/public/links/{}/consents", link.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(stores.consents.is_empty(), Ok(true));

    let stored = stores
        .links
        .find_by_token(&link.token)
        .expect("lookup")
        .expect("present");
    assert!(stored.used_at().is_none());
}

#[tokio::test]
async fn expired_public_link_is_gone() {
    let stores = stores();
    stores.publish("privacy", &["1.0"]);
    let link = stores.seed_expired_link(&["privacy"]);

    let response = stores
        .router()
        .oneshot(
            Request::get(format!("/public/links/{}", link.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::GONE);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "expired");
}

#[tokio::test]
async fn link_management_is_tenant_scoped() {
    let stores = stores();
    stores.publish("privacy", &["1.0"]);
    let link = stores.seed_link(&["privacy"], 2, chrono::Utc::now());
    let uri = format!("/api/v1/links/{}", link.token);

    let foreign = stores
        .router()
        .oneshot(
            Request::delete(uri.as_str())
                .header(TENANT_HEADER, "globex")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let owned = stores
        .router()
        .oneshot(get(&uri))
        .await
        .expect("route executes");
    assert_eq!(owned.status(), StatusCode::OK);

    let deleted = stores
        .router()
        .oneshot(
            Request::delete(uri.as_str())
                .header(TENANT_HEADER, "acme")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(stores.links.is_empty(), Ok(true));
}
