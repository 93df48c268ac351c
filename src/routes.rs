// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, fiches, questions, quiz, results},
    state::AppState,
    utils::jwt::{auth_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Public routes: registration and login.
/// * Everything else requires a valid bearer token.
/// * Creating fiches additionally requires the teacher (or admin) role;
///   editing is restricted to the fiche's author inside the handlers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/fiches",
            get(fiches::list_fiches)
                .merge(post(fiches::create_fiche).layer(middleware::from_fn(teacher_middleware))),
        )
        .route(
            "/api/fiches/{id}",
            get(fiches::get_fiche)
                .put(fiches::update_fiche)
                .delete(fiches::delete_fiche),
        )
        .route(
            "/api/fiches/{id}/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route("/api/fiches/{id}/quiz", get(quiz::open_quiz))
        .route("/api/fiches/{id}/quiz/submit", post(quiz::submit_quiz))
        .route("/api/fiches/{id}/results", get(results::fiche_results))
        .route(
            "/api/questions/{id}",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        .route("/api/attempts/{id}", get(results::get_attempt))
        .route("/api/results/me", get(results::my_results))
        .route(
            "/api/authoring/pending",
            get(fiches::pending_work).layer(middleware::from_fn(teacher_middleware)),
        )
        // Only matched routes demand a token, unknown paths still 404.
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
