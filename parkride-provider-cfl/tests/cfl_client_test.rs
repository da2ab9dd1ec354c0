#![allow(clippy::unwrap_used)]
// Integration tests for `CflClient` using wiremock.

use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parkride_core::{ParkingPort, PortError, SiteId, TokenListener};
use parkride_provider_cfl::CflClient;

// ── Helpers ─────────────────────────────────────────────────────────

fn recording_listener() -> (TokenListener, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = TokenListener::new(move |token| sink.lock().unwrap().push(token.to_owned()));
    (listener, seen)
}

fn client(server: &MockServer, refresh_token: Option<&str>) -> CflClient {
    CflClient::new(
        reqwest::Client::new(),
        refresh_token.map(|token| SecretString::from(token.to_owned())),
        None,
    )
    .with_base_url(server.uri())
}

async fn mount_refresh(server: &MockServer, from: &str, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": from })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": access,
            "refreshToken": refresh,
        })))
        .mount(server)
        .await;
}

fn occupancy_body() -> serde_json::Value {
    json!({
        "occupiedTotalSpaces": 120,
        "totalSpaces": 480,
        "occupiedElectricalSpaces": 3,
        "totalElectricalSpaces": 10,
        "occupiedPmrSpaces": 1,
        "totalPmrSpaces": 8,
        "label": "ignored"
    })
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_login_returns_refresh_token() {
    let server = MockServer::start().await;
    let (listener, seen) = recording_listener();

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "rider@example.lu", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CflClient::new(reqwest::Client::new(), None, Some(listener))
        .with_base_url(format!("{}/", server.uri()));
    let password = SecretString::from("hunter2".to_owned());
    let token = client
        .authenticate("rider@example.lu", &password)
        .await
        .unwrap();

    assert_eq!(token.expose_secret(), "refresh-1");
    assert_eq!(*seen.lock().unwrap(), vec!["refresh-1"]);
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let password = SecretString::from("wrong".to_owned());
    let result = client(&server, None)
        .authenticate("rider@example.lu", &password)
        .await;

    assert!(
        matches!(result, Err(PortError::InvalidCredentials)),
        "expected InvalidCredentials, got: {result:?}"
    );
}

#[tokio::test]
async fn test_refresh_expired() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client(&server, Some("stale")).refresh_tokens().await;

    assert!(
        matches!(result, Err(PortError::AuthExpired)),
        "expected AuthExpired, got: {result:?}"
    );
}

#[tokio::test]
async fn test_refresh_without_token() {
    let server = MockServer::start().await;

    let result = client(&server, None).refresh_tokens().await;

    assert!(matches!(result, Err(PortError::NotAuthenticated)));
}

#[tokio::test]
async fn test_rotation_notifies_once_per_token() {
    let server = MockServer::start().await;
    let (listener, seen) = recording_listener();

    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;
    mount_refresh(&server, "refresh-1", "access-2", "refresh-1").await;

    let client = CflClient::new(
        reqwest::Client::new(),
        Some(SecretString::from("refresh-0".to_owned())),
        Some(listener),
    )
    .with_base_url(server.uri());

    client.refresh_tokens().await.unwrap();
    client.refresh_tokens().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["refresh-1"]);
}

// ── Site tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_site_occupancy() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/parkings/42"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(occupancy_body()))
        .mount(&server)
        .await;

    let occupancy = client(&server, Some("refresh-0"))
        .site(&SiteId::from("42"))
        .await
        .unwrap();

    assert_eq!(occupancy.occupied_total_spaces, 120);
    assert_eq!(occupancy.total_spaces, 480);
    assert_eq!(occupancy.total_electrical_spaces, 10);
    assert_eq!(occupancy.occupied_pmr_spaces, 1);
}

#[tokio::test]
async fn test_unknown_site() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/parkings/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client(&server, Some("refresh-0"))
        .site(&SiteId::from("404"))
        .await;

    assert!(
        matches!(result, Err(PortError::SiteNotFound(ref id)) if id.0 == "404"),
        "expected SiteNotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_network_error() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/parkings/42/subscriptions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client(&server, Some("refresh-0"))
        .subscription_available_spots(&SiteId::from("42"))
        .await;

    assert!(matches!(result, Err(PortError::Network(_))));
}

#[tokio::test]
async fn test_subscription_spots() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/parkings/42/subscriptions"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "availableSpots": 3 })))
        .mount(&server)
        .await;

    let spots = client(&server, Some("refresh-0"))
        .subscription_available_spots(&SiteId::from("42"))
        .await
        .unwrap();

    assert_eq!(spots, 3);
}

#[tokio::test]
async fn test_list_sites_accepts_numeric_ids() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/parkings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 12, "name": "Mersch" },
            { "id": "P+R-7", "name": "Howald" }
        ])))
        .mount(&server)
        .await;

    let sites = client(&server, Some("refresh-0")).list_sites().await.unwrap();

    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0].id, SiteId::from("12"));
    assert_eq!(sites[1].id, SiteId::from("P+R-7"));
    assert_eq!(sites[1].name, "Howald");
}

// ── Token renewal tests ─────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_access_token_is_renewed_once() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;
    mount_refresh(&server, "refresh-1", "access-2", "refresh-2").await;

    Mock::given(method("GET"))
        .and(path("/parkings/42"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/parkings/42"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(occupancy_body()))
        .expect(1)
        .mount(&server)
        .await;

    let occupancy = client(&server, Some("refresh-0"))
        .site(&SiteId::from("42"))
        .await
        .unwrap();

    assert_eq!(occupancy.total_spaces, 480);
}

#[tokio::test]
async fn test_repeated_rejection_is_auth_expired() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-0", "access-1", "refresh-1").await;
    mount_refresh(&server, "refresh-1", "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/parkings/42"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client(&server, Some("refresh-0"))
        .site(&SiteId::from("42"))
        .await;

    assert!(matches!(result, Err(PortError::AuthExpired)));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/parkings/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(occupancy_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/parkings/1/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "availableSpots": 0 })))
        .mount(&server)
        .await;

    let client = client(&server, Some("refresh-0"));
    let id = SiteId::from("1");
    let (occupancy, spots) = tokio::join!(client.site(&id), client.subscription_available_spots(&id));

    assert_eq!(occupancy.unwrap().occupied_total_spaces, 120);
    assert_eq!(spots.unwrap(), 0);
}
