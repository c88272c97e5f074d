// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{eligibility, exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

const ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// Assembles the application router.
///
/// * `/api/exam`: candidate routes, JWT protected.
/// * `/api/admin`: admin routes, JWT plus admin role.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let exam_routes = Router::new()
        .route("/sessions", post(exam::start_exam))
        .route("/sessions/{id}", get(exam::get_session))
        .route("/sessions/{id}/answers", post(exam::record_answer))
        .route("/sessions/{id}/signals", post(exam::post_signal))
        .route("/sessions/{id}/directives", get(exam::get_directives))
        .route("/sessions/{id}/submit", post(exam::submit_exam))
        .route("/eligibility", get(eligibility::get_my_eligibility))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route(
            "/eligibility/{user_id}/restore",
            post(eligibility::restore_eligibility),
        )
        .route("/sessions/{id}/revoke", post(eligibility::revoke_session))
        // Auth runs first, then the role check.
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/exam", exam_routes)
        .nest("/api/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
