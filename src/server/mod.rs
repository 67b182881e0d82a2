//! Web server module with JWT authentication

pub mod http;
pub mod auth;

use anyhow::{Result, Context};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::Html,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analysis::DatasetCache;
use crate::chatbot::{ChatBot, ChatSessions};
use crate::config::Config;
use crate::server::auth::AuthState;
use crate::storage::{DocumentStore, SqliteStore};

/// How often expired revocations and lockouts are purged
const AUTH_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub documents: DocumentStore,
    pub auth_state: Arc<AuthState>,
    pub cache: Arc<DatasetCache>,
    pub bot: Arc<ChatBot>,
    pub sessions: Arc<ChatSessions>,
}

impl AppState {
    /// Open the database and upload directory named by the config
    pub async fn new(config: Config) -> Result<Self> {
        let store = SqliteStore::new(&config.storage.database_path).await?;
        let documents = DocumentStore::new(&config.storage.upload_dir).await?;

        let secret = match &config.auth.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                warn!("No JWT secret configured; tokens will not survive a restart");
                auth::generate_jwt_secret()
            }
        };
        let auth_state = AuthState::new(secret, config.auth.clone());

        Ok(Self {
            store: Arc::new(store),
            documents,
            auth_state,
            cache: Arc::new(DatasetCache::new(config.analysis.cache_capacity)),
            bot: Arc::new(ChatBot::new(config.chatbot.min_confidence)),
            sessions: Arc::new(ChatSessions::new(config.chatbot.history_limit)),
            config: Arc::new(config),
        })
    }
}

/// All routes with their middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_mb * 1024 * 1024;

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Protected routes (require JWT auth)
    let protected = Router::new()
        .route(
            "/api/patients",
            get(http::list_patients_handler).post(http::create_patient_handler),
        )
        .route(
            "/api/patients/{id}",
            get(http::get_patient_handler)
                .put(http::update_patient_handler)
                .delete(http::delete_patient_handler),
        )
        .route("/api/patients/{id}/analysis", get(http::patient_analysis_handler))
        .route(
            "/api/patients/{id}/documents/{index}",
            get(http::download_document_handler),
        )
        .route(
            "/api/patients/{id}/chat",
            post(http::patient_chat_handler)
                .get(http::chat_history_handler)
                .delete(http::clear_chat_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.auth_state.clone(),
            auth::auth_middleware,
        ));

    // Public routes (no auth required)
    let public = Router::new()
        .route("/", get(index_page))
        .route("/api/status", get(http::status_handler))
        .route("/api/auth/register", post(http::register_handler))
        .route("/api/auth/login", post(http::login_handler))
        .route("/api/auth/refresh", post(http::refresh_handler))
        .route("/api/auth/logout", post(http::logout_handler))
        .route("/api/guest/analysis", post(http::guest_analysis_handler))
        .route("/api/guest/chat", post(http::guest_chat_handler));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let https = config.server.https;
    let tls_files = (config.server.cert.clone(), config.server.key.clone());

    let state = AppState::new(config).await?;

    let auth_state = state.auth_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUTH_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            auth_state.cleanup();
        }
    });

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Datai Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Server binding to: {}", addr);
    println!("✓ Database: {}", state.config.storage.database_path.display());
    println!("✓ Uploads: {}", state.documents.root().display());
    println!("✓ Upload limit: {} MB", state.config.server.max_upload_mb);
    if https {
        println!("✓ HTTPS enabled");
    } else {
        println!("⚠ HTTPS disabled");
    }
    println!("✓ JWT authentication enabled");
    println!();
    println!("🚀 Listening on http{}://{}", if https { "s" } else { "" }, addr);
    println!();

    let app = build_router(state);

    if https {
        let (Some(cert_path), Some(key_path)) = tls_files else {
            anyhow::bail!("HTTPS requires both server.cert and server.key");
        };
        let cert_data = tokio::fs::read(&cert_path).await
            .context("Failed to read certificate file")?;
        let key_data = tokio::fs::read(&key_path).await
            .context("Failed to read key file")?;

        let tls = axum_server::tls_rustls::RustlsConfig::from_pem(cert_data, key_data).await?;
        info!("Serving HTTPS on {}", addr);
        axum_server::bind_rustls(addr, tls).serve(app.into_make_service()).await?;
        return Ok(());
    }

    info!("Serving HTTP on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}

/// Handler for the index page
async fn index_page() -> Html<&'static str> {
    Html(r#"<!DOCTYPE html>
<html>
<head>
    <title>Datai</title>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
            background: #1a1a1a;
            color: #e0e0e0;
        }
        h1 { color: #4CAF50; }
        .status {
            background: #2a2a2a;
            padding: 15px;
            border-radius: 8px;
            margin: 20px 0;
        }
        .endpoint {
            background: #333;
            padding: 10px;
            margin: 10px 0;
            border-radius: 4px;
            font-family: monospace;
        }
    </style>
</head>
<body>
    <h1>Datai - Patient Movement Analysis</h1>
    <div class="status">
        <p>Upload goniometry recordings (CSV or Excel) to get joint-angle statistics, chart data and answers to questions.</p>
        <p>Register, then use /api/auth/login to get a token for the patient endpoints.</p>
    </div>
    <h2>Public</h2>
    <div class="endpoint">GET /api/status - Server status</div>
    <div class="endpoint">POST /api/auth/register - Create an account</div>
    <div class="endpoint">POST /api/auth/login - Authenticate and get JWT tokens</div>
    <div class="endpoint">POST /api/auth/refresh - Refresh access token</div>
    <div class="endpoint">POST /api/auth/logout - Revoke a token</div>
    <div class="endpoint">POST /api/guest/analysis - Analyse a file without an account (field: file)</div>
    <div class="endpoint">POST /api/guest/chat - Ask about a file without an account (fields: file, question)</div>
    <h2>Patients (Bearer token)</h2>
    <div class="endpoint">GET | POST /api/patients</div>
    <div class="endpoint">GET | PUT | DELETE /api/patients/{id}</div>
    <div class="endpoint">GET /api/patients/{id}/analysis</div>
    <div class="endpoint">GET /api/patients/{id}/documents/{index}</div>
    <div class="endpoint">POST | GET | DELETE /api/patients/{id}/chat</div>
</body>
</html>"#)
}
