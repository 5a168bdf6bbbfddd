//! HTTP round trips through the router.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use ticket_sale_core::Config;
use ticket_sale_runtime::slug::{DEBUG_GREETING, SCALING_UNSUPPORTED};
use ticket_sale_runtime::{Slug, launch};
use ticket_sale_web::{AppState, CUSTOMER_ID_HEADER, SERVER_ID_HEADER, build_router};
use ticket_sale_testing::init_tracing;
use tower::ServiceExt;

// ============================================================================
// Test Fixtures
// ============================================================================

fn app(tickets: u32, servers: usize) -> Router {
    init_tracing();
    let config = Config::default()
        .with_tickets(tickets)
        .with_initial_servers(servers)
        .with_estimator_interval(Duration::from_millis(10));
    let balancer = launch(config).unwrap();
    build_router(AppState::new(Arc::new(balancer)))
}

fn slug_app(tickets: u32) -> Router {
    init_tracing();
    let slug = Slug::new(&Config::default().with_tickets(tickets));
    build_router(AppState::new(Arc::new(slug)))
}

struct Reply {
    status: StatusCode,
    customer: Option<String>,
    server: Option<String>,
    body: String,
}

async fn call(app: &Router, method: &str, path: &str, identity: &[(&str, &str)], body: &str) -> Reply {
    let mut request = Request::builder().method(method).uri(path);
    for (name, value) in identity {
        request = request.header(*name, *value);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let (customer, server) = (header(CUSTOMER_ID_HEADER), header(SERVER_ID_HEADER));
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    Reply {
        status,
        customer,
        server,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn reserve_and_buy_over_http() {
    let app = app(2, 1);

    let reserved = call(&app, "POST", "/api/reserve_ticket", &[], "").await;
    assert_eq!(reserved.status, StatusCode::OK);
    let customer = reserved.customer.expect("customer id assigned");
    let server = reserved.server.expect("server id assigned");
    let ticket = reserved.body.clone();
    assert!(ticket.parse::<u32>().is_ok());

    let identity = [(CUSTOMER_ID_HEADER, customer.as_str()), (SERVER_ID_HEADER, server.as_str())];
    let again = call(&app, "POST", "/api/reserve_ticket", &identity, "").await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.body, "A ticket has already been reserved!");

    let bought = call(&app, "POST", "/api/buy_ticket", &identity, &ticket).await;
    assert_eq!(bought.status, StatusCode::OK);
    assert_eq!(bought.body, ticket);
    assert_eq!(bought.customer.as_deref(), Some(customer.as_str()));
    assert_eq!(bought.server.as_deref(), Some(server.as_str()));
}

#[tokio::test]
async fn sold_out_is_a_plain_answer() {
    let app = app(1, 1);
    call(&app, "POST", "/api/reserve_ticket", &[], "").await;

    let late = call(&app, "POST", "/api/reserve_ticket", &[], "").await;
    assert_eq!(late.status, StatusCode::OK);
    assert_eq!(late.body, "SOLD OUT");
}

#[tokio::test]
async fn admin_endpoints_scale_and_list() {
    let app = app(10, 1);

    let scaled = call(&app, "POST", "/api/admin/num_servers", &[], "3").await;
    assert_eq!(scaled.body, "3");

    let count = call(&app, "GET", "/api/admin/num_servers", &[], "").await;
    assert_eq!(count.body, "3");

    let listed = call(&app, "GET", "/api/admin/get_servers", &[], "").await;
    assert_eq!(listed.body.lines().count(), 3);
    assert!(listed.body.ends_with('\n'));

    let missing = call(&app, "POST", "/api/admin/num_servers", &[], "many").await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body, "No number of servers provided!");
}

#[tokio::test]
async fn invalid_customer_header_is_replaced() {
    let app = app(5, 1);
    let reply = call(&app, "GET", "/api/num_available_tickets", &[(CUSTOMER_ID_HEADER, "not-a-uuid")], "").await;

    assert_eq!(reply.status, StatusCode::OK);
    let customer = reply.customer.unwrap();
    assert_ne!(customer, "not-a-uuid");
    assert!(customer.parse::<ticket_sale_core::CustomerId>().is_ok());
}

#[tokio::test]
async fn debug_returns_registry_json() {
    let app = app(4, 2);
    let reply = call(&app, "GET", "/api/debug", &[], "").await;

    let summary: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(summary["active"].as_array().unwrap().len(), 2);
    assert_eq!(summary["sold"], 0);
}

#[tokio::test]
async fn unknown_paths_and_methods_are_rejected() {
    let app = app(1, 1);
    assert_eq!(call(&app, "GET", "/api/nothing", &[], "").await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        call(&app, "DELETE", "/api/reserve_ticket", &[], "").await.status,
        StatusCode::METHOD_NOT_ALLOWED
    );
}

#[tokio::test]
async fn health_endpoints() {
    let app = app(1, 1);
    let live = call(&app, "GET", "/health", &[], "").await;
    assert_eq!((live.status, live.body.as_str()), (StatusCode::OK, "ok"));

    let ready = call(&app, "GET", "/health/ready", &[], "").await;
    assert_eq!(ready.status, StatusCode::OK);
    let check: serde_json::Value = serde_json::from_str(&ready.body).unwrap();
    assert_eq!(check["system"], "balancer");
    assert_eq!(check["readiness"], "ready");
    assert_eq!(check["active_servers"], 1);

    // No recorder attached in tests.
    let metrics = call(&app, "GET", "/metrics", &[], "").await;
    assert_eq!(metrics.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn slug_sells_but_refuses_to_scale() {
    let app = slug_app(1);

    let reserved = call(&app, "POST", "/api/reserve_ticket", &[], "").await;
    assert_eq!((reserved.status, reserved.body.as_str()), (StatusCode::OK, "0"));
    assert!(reserved.server.is_some());

    let scaled = call(&app, "POST", "/api/admin/num_servers", &[], "3").await;
    assert_eq!(scaled.status, StatusCode::BAD_REQUEST);
    assert_eq!(scaled.body, SCALING_UNSUPPORTED);

    let count = call(&app, "GET", "/api/admin/num_servers", &[], "").await;
    assert_eq!(count.body, "1");

    let debug = call(&app, "GET", "/api/debug", &[], "").await;
    assert_eq!(debug.body, DEBUG_GREETING);

    let ready = call(&app, "GET", "/health/ready", &[], "").await;
    let check: serde_json::Value = serde_json::from_str(&ready.body).unwrap();
    assert_eq!(check["system"], "slug");
    assert_eq!(check["readiness"], "pool_empty");
}
