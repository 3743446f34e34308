use axum::http::StatusCode;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;
use waybank::api::{self, AppState};
use waybank::config::Config;
use waybank::datasource::{MockYieldSource, YieldSource};
use waybank::db::init_db;
use waybank::{Decimal, Repository, WalletAddress};

const ADMIN: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const ALICE: &str = "0x1111111111111111111111111111111111111111";

struct TestApp {
    router: axum::Router,
    admin: String,
    alice: String,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let source: Arc<dyn YieldSource> = Arc::new(MockYieldSource::new());

    let config = Config {
        port: 0,
        database_path: db_path,
        yields_api_url: "http://example.invalid".to_string(),
        pool_cache_ttl: Duration::from_secs(300),
        distribution_enabled: false,
        apr_penalty_pct: Decimal::from_str("7.73").unwrap(),
        min_apr_for_penalty: Decimal::from_i64(30),
        session_ttl: Duration::from_secs(604_800),
        session_activity_interval: Duration::from_secs(300),
        admin_wallets: vec![WalletAddress::from_str(ADMIN).unwrap()],
    };

    let router = api::create_router(AppState::new(repo, config, source));
    let admin = login(&router, ADMIN).await;
    let alice = login(&router, ALICE).await;

    TestApp {
        router,
        admin,
        alice,
        _temp: temp_dir,
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    session: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(token) = session {
        builder = builder.header("x-session-id", token);
    }
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn login(app: &axum::Router, wallet: &str) -> String {
    let (_, body) = send(
        app,
        "POST",
        "/api/session/login",
        None,
        Some(json!({"walletAddress": wallet})),
    )
    .await;
    body["sessionId"].as_str().unwrap().to_string()
}

fn contact_form() -> Value {
    json!({
        "fullName": "Ada Lovelace",
        "email": "ada@example.com",
        "phone": "600000000",
        "phoneCountryCode": "es",
        "phoneFormatted": "+34 600 000 000",
        "investmentSize": "50k-100k",
        "consent": true,
        "languagePreference": "en"
    })
}

async fn submit_lead(app: &TestApp) -> i64 {
    let (status, body) = send(&app.router, "POST", "/api/leads", None, Some(contact_form())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["success"], true);
    body["leadId"].as_i64().unwrap()
}

#[tokio::test]
async fn test_public_lead_submission_is_listed_for_admin() {
    let app = setup_test_app().await;
    let id = submit_lead(&app).await;

    let (status, body) = send(&app.router, "GET", "/api/admin/leads", Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let leads = body.as_array().unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["id"], id);
    assert_eq!(leads[0]["status"], "new");
    assert_eq!(leads[0]["source"], "landing_page");
    assert_eq!(leads[0]["languagePreference"], "en");
    assert_eq!(leads[0]["additionalData"]["phoneCountryCode"], "es");
    assert_eq!(leads[0]["additionalData"]["phoneFormatted"], "+34 600 000 000");

    let (status, _) = send(&app.router, "GET", "/api/admin/leads", Some(&app.alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/admin/leads/999",
        Some(&app.admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lead_submission_validation() {
    let app = setup_test_app().await;

    for (field, value) in [
        ("fullName", json!("A")),
        ("email", json!("not-an-email")),
        ("investmentSize", json!("")),
        ("consent", json!(false)),
    ] {
        let mut form = contact_form();
        form[field] = value;
        let (status, body) = send(&app.router, "POST", "/api/leads", None, Some(form)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} should be rejected", field);
        assert!(body["error"].is_string());
    }

    let (_, body) = send(&app.router, "GET", "/api/admin/leads", Some(&app.admin), None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_updates_lead_pipeline() {
    let app = setup_test_app().await;
    let id = submit_lead(&app).await;
    let uri = format!("/api/admin/leads/{}", id);

    let (status, _) = send(
        &app.router,
        "PATCH",
        &uri,
        Some(&app.admin),
        Some(json!({"notes": "no status"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        "PATCH",
        &uri,
        Some(&app.admin),
        Some(json!({
            "status": "contacted",
            "notes": "Left a voicemail",
            "assignedTo": "sales@example.com",
            "followUpDate": "2026-03-01T10:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["lead"]["status"], "contacted");
    assert_eq!(body["lead"]["notes"], "Left a voicemail");
    assert_eq!(body["lead"]["followUpDate"], 1_772_359_200_000i64);
    assert!(body["lead"]["lastContact"].is_i64());

    let (status, body) = send(
        &app.router,
        "PATCH",
        &uri,
        Some(&app.admin),
        Some(json!({"status": "interested", "followUpDate": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lead"]["followUpDate"], Value::Null);
    assert_eq!(body["lead"]["notes"], "Left a voicemail");

    let (status, _) = send(
        &app.router,
        "PATCH",
        &uri,
        Some(&app.admin),
        Some(json!({"status": "archived"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        "PATCH",
        "/api/admin/leads/999",
        Some(&app.admin),
        Some(json!({"status": "converted"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
