use std::{any::Any as PanicPayload, net::SocketAddr, sync::Arc};

use axum::{
    middleware::from_fn,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod auth;
mod config;
mod db;
mod error;
mod middleware;
mod model;
mod state;

use config::Config;
use db::{
    memory::MemoryStore,
    store::{IdentityStore, PlaylistSeeder},
    DBLayer,
};
use error::AuthError;
use state::AppState;

fn app(state: AppState, config: &Config) -> Router {
    let routes = Router::new()
        .merge(api::router())
        .merge(auth::router(config));
    layered(routes, config).with_state(state)
}

fn layered(routes: Router<AppState>, config: &Config) -> Router<AppState> {
    let mut router = routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http());

    if config.cors_allow_any {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        );
    }

    router
}

fn panic_response(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "handler panicked");
    AuthError::internal("Internal server error").into_response()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // -----------------------------
    // Storage
    // -----------------------------
    let (store, playlists): (Arc<dyn IdentityStore>, Arc<dyn PlaylistSeeder>) =
        if config.db_path == Config::MEMORY_DB {
            info!("using in-memory store; data is lost on exit");
            let mem = Arc::new(MemoryStore::new());
            (
                mem.clone() as Arc<dyn IdentityStore>,
                mem as Arc<dyn PlaylistSeeder>,
            )
        } else {
            let db = Arc::new(DBLayer::new(&config.db_path)?);
            info!(path = %config.db_path, "opened rocksdb store");
            (
                db.clone() as Arc<dyn IdentityStore>,
                db as Arc<dyn PlaylistSeeder>,
            )
        };

    let state = AppState::new(store, playlists, &config);
    let router = app(state, &config);

    let addr = config.bind_addr();
    info!(%addr, "companion auth API listening");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::login::test_support::{access_token, dpop_proof};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        routing::get,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        app_with(Config::default())
    }

    fn app_with(config: Config) -> Router {
        let mem = Arc::new(MemoryStore::new());
        app(AppState::new(mem.clone(), mem, &config), &config)
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn qr_generate_and_poll() {
        let app = test_app();
        let (status, body) = call(
            &app,
            Request::post("/auth/qr/generate").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();
        assert!(body["expires_at"].is_string());
        assert!(body.get("api_key").is_none());

        let (status, body) = call(
            &app,
            Request::get(format!("/auth/qr/poll/{id}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "pending"}));

        let (status, body) = call(
            &app,
            Request::get("/auth/qr/poll/unknown").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");

        let (status, _) = call(
            &app,
            Request::get("/auth/qr/poll/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_then_logout_revokes_key() {
        let app = test_app();
        let login = json!({
            "access_token": access_token("u1"),
            "dpop_proof": dpop_proof("phone"),
            "device_info": "Android TV"
        });

        let (status, body) = call(&app, post_json("/auth/login", login.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User registered successfully");
        assert_eq!(body["floatplane_user_id"], "u1");
        let key = body["api_key"].as_str().unwrap().to_string();

        let (_, again) = call(&app, post_json("/auth/login", login)).await;
        assert_eq!(again["message"], "User logged in successfully");
        assert_eq!(again["api_key"], key.as_str());

        let logout = || {
            Request::post("/auth/logout")
                .header(header::AUTHORIZATION, format!("Bearer {key}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = call(&app, logout()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out successfully. API key invalidated.");
        assert!(body.get("api_key").is_none());

        let (status, body) = call(&app, logout()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn login_rejects_bad_input() {
        let app = test_app();

        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid body");

        let (status, _) = call(&app, post_json("/auth/login", json!({"device_info": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            post_json(
                "/auth/login",
                json!({"access_token": "nope", "dpop_proof": dpop_proof("phone")}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid Floatplane token");
    }

    #[tokio::test]
    async fn logout_requires_bearer() {
        let app = test_app();
        for auth in [None, Some("Token abc")] {
            let mut req = Request::post("/auth/logout");
            if let Some(v) = auth {
                req = req.header(header::AUTHORIZATION, v);
            }
            let (status, body) = call(&app, req.body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body["message"].as_str().unwrap().contains("Bearer"));
        }
    }

    #[tokio::test]
    async fn root_health_and_request_id() {
        let app = test_app();
        let res = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(middleware::REQUEST_ID_HEADER));

        let (_, body) = call(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn login_is_rate_limited_per_client() {
        let mut config = Config::default();
        config.rate_limits.login = 2;
        let app = app_with(config);

        let login = |ip: &str| {
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", ip)
                .body(Body::from(json!({"device_info": "x"}).to_string()))
                .unwrap()
        };

        for _ in 0..2 {
            let (status, _) = call(&app, login("198.51.100.1")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, body) = call(&app, login("198.51.100.1")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded");

        let (status, _) = call(&app, login("198.51.100.2")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn qr_routes_are_rate_limited() {
        let mut config = Config::default();
        config.rate_limits.qr_generate = 1;
        config.rate_limits.qr_poll = 1;
        let app = app_with(config);

        let generate = || Request::post("/auth/qr/generate").body(Body::empty()).unwrap();
        assert_eq!(call(&app, generate()).await.0, StatusCode::CREATED);
        assert_eq!(call(&app, generate()).await.0, StatusCode::TOO_MANY_REQUESTS);

        let poll = || Request::get("/auth/qr/poll/abc").body(Body::empty()).unwrap();
        assert_eq!(call(&app, poll()).await.0, StatusCode::NOT_FOUND);
        assert_eq!(call(&app, poll()).await.0, StatusCode::TOO_MANY_REQUESTS);

        // Logout is not behind a limiter.
        let logout = || Request::post("/auth/logout").body(Body::empty()).unwrap();
        assert_eq!(call(&app, logout()).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(call(&app, logout()).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        async fn boom() -> &'static str {
            panic!("boom")
        }

        let config = Config::default();
        let mem = Arc::new(MemoryStore::new());
        let app = layered(Router::new().route("/boom", get(boom)), &config)
            .with_state(AppState::new(mem.clone(), mem, &config));

        let (status, body) = call(&app, Request::get("/boom").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");
    }
}
