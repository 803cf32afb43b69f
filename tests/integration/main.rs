//! Integration tests for the guild bot server.
//!
//! The router tests run everywhere. The platform tests need real credentials
//! (`BOT_APP_ID`, `BOT_TOKEN`) and are ignored by default.
//! Run with: cargo test --test integration -- --ignored
//!
//! Note: The ignored tests talk to the sandbox API.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use guild_bot_server::api::{create_app, create_router, hello_world, AppState};
use guild_bot_server::bot::{
    self, GatewayEvent, Intent, MessageToCreate, MockApiConfig, MockApiServer,
};
use guild_bot_server::config::{BotConfig, Config};

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Start the router, hit both routes, then an unknown path.
#[tokio::test]
async fn test_router_end_to_end() {
    let app = create_router();

    let (status, body) = get(app.clone(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "respond with a resource");

    let (status, body) = get(app.clone(), "/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello World!");

    let (status, _) = get(app, "/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// The exported handler can be mounted on a host application's own router.
#[tokio::test]
async fn test_hello_world_mounts_on_host_router() {
    let host = Router::new().route("/greet", axum::routing::get(hello_world));

    let (status, body) = get(host, "/greet").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello World!");
}

/// The resource router nests under a prefix like any other router.
#[tokio::test]
async fn test_router_nests_under_prefix() {
    let host = Router::new().nest("/users", create_router());

    let (status, body) = get(host.clone(), "/users/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello World!");

    let (status, _) = get(host, "/hello").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// The served app answers a real TCP request.
#[tokio::test]
async fn test_served_over_tcp() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_app(AppState::new(false)))
            .await
            .unwrap();
    });

    let body = reqwest::get(format!("http://{}/hello", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "Hello World!");
}

/// Handles build from a static config without touching the network.
#[test]
fn test_handles_construct_from_static_config() {
    let config = BotConfig {
        app_id: "102351684".to_string(),
        token: "test-token".to_string(),
        intents: vec![Intent::PublicGuildMessages],
        sandbox: true,
    };

    assert!(bot::create_openapi(&config).is_ok());
    assert!(bot::create_websocket(&config).is_ok());
}

/// The REST client talks to a local mock of the bot API.
#[tokio::test]
async fn test_rest_client_against_mock_api() {
    let server = MockApiServer::start(MockApiConfig {
        gateway_url: "ws://127.0.0.1:1".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();
    let config = BotConfig {
        app_id: "102351684".to_string(),
        token: "test-token".to_string(),
        intents: vec![Intent::PublicGuildMessages],
        sandbox: true,
    };
    let api = server.client(&config).unwrap();

    let me = tokio_test::assert_ok!(api.me().await);
    assert_eq!(me.username, "mock-bot");

    let gateway = tokio_test::assert_ok!(api.gateway_bot().await);
    assert_eq!(gateway.url, "ws://127.0.0.1:1");

    let sent = api
        .post_message("chan-9", &MessageToCreate::reply("hi", "m-9"))
        .await
        .unwrap();
    assert_eq!(sent.channel_id, "chan-9");
    assert_eq!(server.posted()[0].msg_id.as_deref(), Some("m-9"));
}

/// Get a bot config from environment.
fn live_config() -> Option<(Config, BotConfig)> {
    dotenvy::dotenv().ok();

    let config = Config::load().ok()?;
    let bot = config.bot_config().ok()?;
    Some((config, bot))
}

/// Test that we can fetch the bot user.
#[tokio::test]
#[ignore = "requires BOT_APP_ID and BOT_TOKEN"]
async fn test_get_me() {
    let Some((config, bot)) = live_config() else {
        println!("Skipping: BOT_APP_ID / BOT_TOKEN not set or invalid");
        return;
    };

    let (api, _) = bot::create_handles(&config, &bot).unwrap();
    let user = api.me().await;
    assert!(user.is_ok(), "Failed to get bot user: {:?}", user.err());
}

/// Test that the gateway reaches READY.
#[tokio::test]
#[ignore = "requires BOT_APP_ID and BOT_TOKEN"]
async fn test_gateway_ready() {
    let Some((config, bot)) = live_config() else {
        println!("Skipping: BOT_APP_ID / BOT_TOKEN not set or invalid");
        return;
    };

    let (_, gateway) = bot::create_handles(&config, &bot).unwrap();
    let gateway = Arc::new(gateway);
    let (mut events, task) = gateway.clone().run_with_reconnect();

    let ready = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(event) = events.recv().await {
            if let GatewayEvent::Ready { session_id, .. } = event {
                return Some(session_id);
            }
        }
        None
    })
    .await
    .ok()
    .flatten();
    task.abort();

    assert!(ready.is_some(), "gateway did not become ready");
    assert_eq!(gateway.session_id(), ready);
}
