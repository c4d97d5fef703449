use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middlewares::trace::TRACE_ID_HEADER),
        ])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Prometheus scrape endpoint behind HTTP Basic auth
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .nest("/api", api_routes(app_state.clone()).layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn api_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public: the only way to obtain or recover an identity token
    let auth_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/set-password", post(handlers::auth::set_password));

    auth_routes
        .merge(assessment_routes(app_state.clone()))
        .merge(admin_routes(app_state))
}

fn assessment_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let upload_limit = app_state.config.upload_limit_bytes;

    Router::new()
        .route(
            "/create-assessment",
            post(handlers::assessments::create_assessment),
        )
        .route(
            "/get-assessments",
            post(handlers::assessments::get_assessments),
        )
        .route(
            "/submit-mc-answer",
            post(handlers::assessments::submit_mc_answer),
        )
        .route(
            "/submit-audio-answer",
            post(handlers::assessments::submit_audio_answer),
        )
        .route(
            "/finish-assessment",
            post(handlers::assessments::finish_assessment),
        )
        .route(
            "/get-assessment-student-responses",
            post(handlers::grading::get_student_responses),
        )
        .route(
            "/get-assessment-answers",
            post(handlers::grading::get_student_responses),
        )
        .route(
            "/submit-audio-grade",
            post(handlers::grading::submit_audio_grade),
        )
        .route(
            "/upload-audio",
            post(handlers::uploads::upload_audio).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn admin_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/admin/get-assessments",
            post(handlers::admin::list_all_assessments),
        )
        .route("/admin/get-users", post(handlers::admin::list_users))
        .route("/admin/create-user", post(handlers::admin::create_user))
        .route(
            "/admin/reset-password",
            post(handlers::admin::reset_user_password),
        )
        .route("/admin/remove-user", post(handlers::admin::remove_user))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
