use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use lavaserver::{LogState, ServerBuilder};
use serde_json::Value;
use tower::ServiceExt;
use tracing::Level;
use tracing_subscriber::{Registry, filter::LevelFilter, reload};

fn log_state() -> LogState {
    let (_, handle) = reload::Layer::<LevelFilter, Registry>::new(LevelFilter::INFO);
    LogState::new(8, Level::INFO, handle)
}

async fn json(router: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn json_route_is_served() {
    let mut server = ServerBuilder::new("test", "", 0).build();
    server
        .add_route("/api/status", || async { serde_json::json!({"status": "ok"}) })
        .await;

    let (status, body) = json(
        server.router().await,
        Request::get("/api/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn log_level_can_be_read_and_changed() {
    let mut server = ServerBuilder::new("test", "", 0).build();
    let state = log_state();
    server.register_log_routes(state.clone()).await;
    let router = server.router().await;

    let (status, body) = json(
        router.clone(),
        Request::get("/api/logs/log_setup").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_level"], "INFO");

    let (status, body) = json(
        router.clone(),
        Request::post("/api/logs/log_setup")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"level":"debug"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_level"], "DEBUG");
    assert_eq!(state.get_max_level(), Level::DEBUG);

    let (status, body) = json(
        router.clone(),
        Request::post("/api/logs/log_setup")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"level":"loud"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = json(
        router,
        Request::get("/api-docs/logs.json").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/log_setup").is_some());
}

#[tokio::test]
async fn log_dump_starts_empty() {
    let mut server = ServerBuilder::new("test", "", 0).build();
    server.register_log_routes(log_state()).await;

    let (status, body) = json(
        server.router().await,
        Request::get("/log-dump").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}
