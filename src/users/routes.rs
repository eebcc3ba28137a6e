// Route table for user endpoints
//
// Access requirements live in the gate's policy table, keyed on the same
// patterns registered here.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use crate::auth::gate;

pub fn routes() -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/all/search", get(handlers::search_users))
        .route("/auth/me", get(handlers::current_user))
        .route("/auth/local", post(handlers::login_local))
        .route("/auth/social/:service", post(handlers::login_social))
        .route("/auth/social/:service/url", get(handlers::social_auth_url))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
        .route("/auth/change-password", post(handlers::change_password))
        .route("/verifications/request", post(handlers::request_verification))
        .route("/verifications/confirm", post(handlers::confirm_verification))
        .route(
            "/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route_layer(middleware::from_fn(gate::check_access))
}
