mod auth;
mod common;
mod services;
mod store;
mod users;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::token::DEFAULT_TOKEN_EXPIRY_HOURS;
use auth::TokenService;
use common::AppState;
use services::{
    EmailSender, FacebookService, GoogleService, SesMailer, SocialProviders, TwitterService,
};
use store::{CredentialStore, MongoStore};
use users::{AuthService, UserService};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Registers the providers whose credentials are configured. Google needs no
/// credentials of our own for token verification, so it is always on.
fn build_providers() -> SocialProviders {
    let mut providers = SocialProviders::new();
    providers.register(AuthService::Google, Arc::new(GoogleService::new()));

    if let (Ok(client_id), Ok(client_secret), Ok(callback_url)) = (
        std::env::var("TWITTER_CLIENT_ID"),
        std::env::var("TWITTER_CLIENT_SECRET"),
        std::env::var("TWITTER_CALLBACK_URL"),
    ) {
        providers.register(
            AuthService::Twitter,
            Arc::new(TwitterService::new(client_id, client_secret, callback_url)),
        );
    }
    if let (Ok(app_id), Ok(callback_url)) = (
        std::env::var("FACEBOOK_APP_ID"),
        std::env::var("FACEBOOK_CALLBACK_URL"),
    ) {
        providers.register(
            AuthService::Facebook,
            Arc::new(FacebookService::new(app_id, callback_url)),
        );
    }
    providers
}

fn build_cors() -> CorsLayer {
    match std::env::var("CORS_ORIGINS") {
        Ok(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        Err(_) => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "account_api=debug,tower_http=debug,axum::rejection=trace".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_uri = env_or("DATABASE_URI", "mongodb://localhost:27017");
    let database_name = env_or("DATABASE_NAME", "account_api");
    let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
    let jwt_expiry_hours = std::env::var("JWT_EXPIRY_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TOKEN_EXPIRY_HOURS);
    let frontend_url = env_or("FRONTEND_URL", "http://localhost:8080");
    let from_email = env_or("SES_FROM_EMAIL", "no-reply@localhost");

    let store: Arc<dyn CredentialStore> =
        Arc::new(MongoStore::connect(&database_uri, &database_name).await?);
    let token_service = Arc::new(TokenService::new(jwt_secret, jwt_expiry_hours));
    let mailer: Arc<dyn EmailSender> = Arc::new(SesMailer::new(from_email));
    let user_service = Arc::new(UserService::new(
        Arc::clone(&store),
        Arc::clone(&token_service),
        mailer,
        Arc::new(build_providers()),
        frontend_url,
    ));

    let state = AppState {
        store,
        token_service,
        user_service,
    };

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api/v1/users", users::routes())
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
