//! End-to-end HTTP tests against a server bound to an ephemeral port.

use chrono::Utc;
use tokio::net::TcpListener;

use pix_outgoing_stream::config::IdentityMode;
use pix_outgoing_stream::http::{self, AppState};

use super::test_helpers::{app_state, codec, harness, harness_with, seed_stream, TestHarness};

const ISPB: &str = "12345678";

async fn spawn_app(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = http::run(listener, state, std::future::pending()).await;
    });
    format!("http://{addr}")
}

async fn spawn_default() -> (TestHarness, String, reqwest::Client) {
    let app = harness().await;
    let base = spawn_app(app_state(&app)).await;
    (app, base, reqwest::Client::new())
}

fn start_url(base: &str) -> String {
    format!("{base}/api/v1/out/{ISPB}/stream/start")
}

#[tokio::test]
async fn health_reports_service_identity() {
    let (_app, base, client) = spawn_default().await;

    let response = client
        .get(format!("{base}/health"))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "pix-outgoing-stream");
}

#[tokio::test]
async fn empty_start_returns_204_with_slot_header() {
    let (_app, base, client) = spawn_default().await;

    let response = client
        .get(start_url(&base))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .headers()
            .get("pi-thread-slot")
            .and_then(|v| v.to_str().ok()),
        Some("0/6")
    );
}

#[tokio::test]
async fn start_delivers_multipart_batch_and_continuation_token() {
    let (app, base, client) = spawn_default().await;
    seed_stream(
        &app.streams,
        ISPB,
        "stream-a",
        7,
        Utc::now(),
        &["<Envelope>pacs.008</Envelope>"],
    )
    .await;

    let response = client
        .get(start_url(&base))
        .header("x-client-id", "client-0")
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("multipart/mixed; boundary=PIX-STREAM")
    );
    let token = response
        .headers()
        .get("pi-pull-next")
        .and_then(|v| v.to_str().ok())
        .expect("continuation token header")
        .to_owned();
    let payload = codec().verify(&token).expect("token verifies");
    assert_eq!(payload.ispb, ISPB);

    let body = response.text().await.expect("body");
    assert!(body.contains("X-Pix-Sequence: 1"));
    assert!(body.contains("<Envelope>pacs.008</Envelope>"));
    assert!(body.trim_end().ends_with("--PIX-STREAM--"));

    // The token drives the follow-up call on the same session.
    let next = client
        .get(format!("{base}/api/v1/out/{ISPB}/stream/{token}"))
        .header("x-client-id", "client-0")
        .send()
        .await
        .expect("request");
    assert_eq!(next.status(), 200);
    assert!(next.headers().contains_key("pi-pull-next"));
}

#[tokio::test]
async fn saturated_participant_gets_429_with_retry_after() {
    let (_app, base, client) = spawn_default().await;

    for idx in 0..6 {
        let response = client
            .get(start_url(&base))
            .header("x-client-id", format!("client-{idx}"))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), 204);
    }

    let response = client
        .get(start_url(&base))
        .header("x-client-id", "client-6")
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 429);
    assert_eq!(
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok()),
        Some("5")
    );
    assert_eq!(
        response
            .headers()
            .get("pi-thread-slot")
            .and_then(|v| v.to_str().ok()),
        Some("6/6")
    );
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["code"], "THREAD_LIMIT");
}

#[tokio::test]
async fn garbage_continuation_token_returns_400() {
    let (_app, base, client) = spawn_default().await;

    let response = client
        .get(format!("{base}/api/v1/out/{ISPB}/stream/not-a-token"))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["code"], "INVALID_PI_PULL_NEXT");
}

#[tokio::test]
async fn admin_release_frees_a_lease() {
    let (_app, base, client) = spawn_default().await;

    for idx in 0..6 {
        client
            .get(start_url(&base))
            .header("x-client-id", format!("client-{idx}"))
            .send()
            .await
            .expect("request");
    }

    let release = client
        .post(format!("{base}/admin/thread-slots/{ISPB}/release"))
        .json(&serde_json::json!({"client_id": "client-0"}))
        .send()
        .await
        .expect("request");
    assert_eq!(release.status(), 200);
    let body: serde_json::Value = release.json().await.expect("json body");
    assert_eq!(body["status"], "released");

    let response = client
        .get(start_url(&base))
        .header("x-client-id", "client-late")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 204, "freed capacity must be usable");
}

#[tokio::test]
async fn missing_identity_is_rejected_when_mtls_required() {
    let app = harness_with(|config| {
        config.security.mtls_required = true;
    })
    .await;
    let base = spawn_app(app_state(&app)).await;
    let client = reqwest::Client::new();

    let anonymous = client
        .get(start_url(&base))
        .send()
        .await
        .expect("request");
    assert_eq!(anonymous.status(), 401);
    let body: serde_json::Value = anonymous.json().await.expect("json body");
    assert_eq!(body["code"], "UNAUTHORIZED");

    let identified = client
        .get(start_url(&base))
        .header("x-mtls-subject", "CN=participant-12345678")
        .send()
        .await
        .expect("request");
    assert_eq!(identified.status(), 204);
}

#[tokio::test]
async fn forwarded_certificate_mode_trusts_only_the_proxy_header() {
    let app = harness_with(|config| {
        config.security.mtls_required = true;
        config.security.identity_mode = IdentityMode::ForwardedCertificate;
    })
    .await;
    let base = spawn_app(app_state(&app)).await;
    let client = reqwest::Client::new();

    let simulated = client
        .get(start_url(&base))
        .header("x-mtls-subject", "CN=participant-12345678")
        .send()
        .await
        .expect("request");
    assert_eq!(
        simulated.status(),
        401,
        "the simulation header must be ignored in forwarded-certificate mode"
    );

    let forwarded = client
        .get(start_url(&base))
        .header(
            "x-forwarded-client-cert-subject",
            "CN=participant-12345678",
        )
        .send()
        .await
        .expect("request");
    assert_eq!(forwarded.status(), 204);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let (_app, base, client) = spawn_default().await;

    let response = client
        .get(format!("{base}/api/v2/nope"))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn request_id_is_echoed_on_the_response() {
    let (_app, base, client) = spawn_default().await;

    let response = client
        .get(format!("{base}/health"))
        .header("x-request-id", "corr-abc-123")
        .send()
        .await
        .expect("request");

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("corr-abc-123")
    );
}
