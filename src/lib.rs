//! Portfolio API - library for app logic and testing

pub mod db;
pub mod error;
pub mod logging;
pub mod routes;
pub mod slug;
pub mod state;
pub mod uploads;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use crate::state::AppState;
use crate::uploads::UploadStore;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to localhost origins in development.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".parse().unwrap(),
                "http://127.0.0.1:3000".parse().unwrap(),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    let uploads_dir = state.uploads().dir().to_path_buf();

    Router::new()
        .route(
            "/api/portfolio",
            get(routes::portfolio::list_items).post(routes::portfolio::create_item),
        )
        .route(
            "/api/portfolio/{id}",
            get(routes::portfolio::get_item)
                .put(routes::portfolio::update_item)
                .delete(routes::portfolio::delete_item),
        )
        .route(
            "/api/posts",
            get(routes::posts::list_posts).post(routes::posts::create_post),
        )
        .route(
            "/api/posts/{slug}",
            get(routes::posts::get_post)
                .put(routes::posts::update_post)
                .delete(routes::posts::delete_post),
        )
        .route("/health", get(routes::health::health_ping))
        .route("/health/database", get(routes::health::health_database))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .fallback(routes::not_found)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        // Raise axum's default 2 MB body cap so 5 MB uploads reach the
        // store's own size check; both caps leave headroom over it
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
        .layer(cors)
        .with_state(state)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init();

    let db_config = db::DbConfig::default();
    let pool = match db::init_pool(&db_config).await {
        Ok(pool) => {
            if let Err(e) = db::run_migrations(&pool).await {
                tracing::error!("Failed to run database migrations: {}", e);
            }
            pool
        }
        Err(e) => {
            tracing::warn!(
                "Database unreachable at startup: {}. Connecting lazily; \
                 requests will fail until it becomes available.",
                e
            );
            db::lazy_pool(&db_config).expect("Invalid DATABASE_URL configuration")
        }
    };

    let state = AppState::new(pool, UploadStore::from_env());
    let app = create_app(state);

    // Bind address is configurable via HOST / PORT env vars, defaulting to
    // 127.0.0.1:3001 so existing dev setups keep working unchanged.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    /// Router over a lazy pool: no live database, so only handlers that
    /// fail before touching it are exercised here.
    fn test_app(dir: &std::path::Path) -> Router {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_lazy("postgresql://localhost/portfolio_test")
            .unwrap();
        create_app(AppState::new(pool, UploadStore::new(dir)))
    }

    #[tokio::test]
    async fn test_unmatched_route_echoes_method_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::get("/api/nope").body(Body::empty()).unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Cannot GET /api/nope");
    }

    #[tokio::test]
    async fn test_health_ping() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_post_without_title_is_rejected_before_db() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::post("/api/posts")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"content":"no title here"}"#))
            .unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();

        // The pool is lazy and unreachable, so a 400 proves the request
        // never reached the database.
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Title is required");
    }

    #[tokio::test]
    async fn test_create_post_with_unsluggable_title_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::post("/api/posts")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"!!!"}"#))
            .unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_post_with_invalid_status_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::post("/api/posts")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"Hello","status":"archived"}"#))
            .unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_portfolio_upload_rejected_before_db() {
        let dir = tempfile::tempdir().unwrap();

        // A "png" whose content is not an image fails validation in the
        // upload store, before any INSERT is attempted.
        let boundary = "test-boundary";
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Broken upload\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"fake.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             this is not a png\r\n\
             --{b}--\r\n",
            b = boundary
        );

        let req = Request::post("/api/portfolio")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        // Nothing was persisted to the upload directory either.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_large_upload_passes_body_limits() {
        let dir = tempfile::tempdir().unwrap();

        // 3 MB PNG: above axum's 2 MB default body cap, within the 5 MB
        // per-file limit.
        let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        png.resize(3 * 1024 * 1024, 0);

        let boundary = "large-upload";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\n\
                 Content-Disposition: form-data; name=\"image\"; filename=\"big.png\"\r\n\
                 Content-Type: image/png\r\n\r\n",
                boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(&png);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let req = Request::post("/api/portfolio")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();

        // The multipart layer and the store both accept the file; only the
        // database write can fail here, proving neither body cap was the
        // bottleneck.
        assert!(!res.status().is_client_error());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_uploads_are_served_statically() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("123-shot.png"), b"pngbytes").unwrap();

        let req = Request::get("/uploads/123-shot.png")
            .body(Body::empty())
            .unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
