// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{admin, attempts, auth, exams, questions},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Nests the auth, exam, question, test and admin routers under `/api`.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool and Config).
pub fn create_router(state: AppState) -> Router {
    let allow_origin = if state.config.cors_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            state
                .config
                .cors_origin
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok()),
        )
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);
    let require_admin = || middleware::from_fn(admin_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/profile", get(auth::profile))
                .layer(require_auth()),
        );

    // Reads are open to any signed-in user; writes need the admin role.
    let exam_routes = Router::new()
        .route(
            "/",
            get(exams::list_exams).merge(post(exams::create_exam).layer(require_admin())),
        )
        .route(
            "/{id}",
            get(exams::get_exam).merge(
                put(exams::update_exam)
                    .delete(exams::delete_exam)
                    .layer(require_admin()),
            ),
        )
        .merge(
            Router::new()
                .route("/{id}/publish", post(exams::publish_exam))
                .route("/{id}/unpublish", post(exams::unpublish_exam))
                .route(
                    "/{id}/questions",
                    get(questions::list_questions).post(questions::add_question),
                )
                .layer(require_admin()),
        )
        .layer(require_auth());

    let question_routes = Router::new()
        .route(
            "/{id}",
            put(questions::update_question).delete(questions::delete_question),
        )
        // Auth first, then Admin check
        .layer(require_admin())
        .layer(require_auth());

    let test_routes = Router::new()
        .route("/attempts", get(attempts::list_my_attempts))
        .route("/attempts/{id}/answers", put(attempts::save_answer))
        .route("/attempts/{id}/submit", post(attempts::submit_attempt))
        .route("/attempts/{id}/results", get(attempts::get_results))
        .route("/{exam_id}/eligibility", get(attempts::check_eligibility))
        .route("/{exam_id}/start", post(attempts::start_attempt))
        .layer(require_auth());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route(
            "/invite-codes",
            get(admin::list_invite_codes).post(admin::create_invite_code),
        )
        .route("/questions/standardize", post(admin::standardize_questions))
        .route("/exams/{id}/attempts", get(admin::list_exam_attempts))
        .layer(require_admin())
        .layer(require_auth());

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/tests", test_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
