// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{activity, admin, attempt, attendance, auth, batch, dashboard, lesson, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, batches, lessons, quizzes, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let batch_routes = Router::new()
        .route("/", get(batch::list_batches).post(batch::create_batch))
        .route(
            "/{id}",
            get(batch::get_batch)
                .put(batch::update_batch)
                .delete(batch::delete_batch),
        )
        .route(
            "/{id}/students",
            get(batch::list_students).post(batch::enroll_student),
        )
        .route("/{id}/students/{student_id}", delete(batch::unenroll_student))
        .route("/{id}/lessons", get(lesson::list_batch_lessons))
        .route("/{id}/quizzes", get(quiz::list_batch_quizzes));

    let lesson_routes = Router::new()
        .route("/", post(lesson::create_lesson))
        .route(
            "/{id}",
            get(lesson::get_lesson)
                .put(lesson::update_lesson)
                .delete(lesson::delete_lesson),
        )
        .route("/{id}/cancel", post(lesson::cancel_lesson))
        .route(
            "/{id}/attendance",
            get(attendance::list_attendance).post(attendance::mark_attendance),
        );

    let quiz_routes = Router::new()
        .route("/", post(quiz::create_quiz))
        .route(
            "/{id}",
            get(quiz::get_quiz)
                .put(quiz::update_quiz)
                .delete(quiz::delete_quiz),
        )
        .route(
            "/{id}/questions",
            get(quiz::list_questions).post(quiz::add_question),
        )
        .route("/{id}/paper", get(quiz::get_paper))
        .route("/{id}/attempts", post(attempt::start_attempt))
        .route("/{id}/statistics", get(quiz::quiz_statistics));

    let question_routes = Router::new().route(
        "/{id}",
        put(quiz::update_question).delete(quiz::delete_question),
    );

    let attempt_routes = Router::new()
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", put(attempt::save_answer))
        .route("/{id}/submit", post(attempt::submit_attempt));

    let me_routes = Router::new().route("/dashboard", get(dashboard::get_dashboard));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/activity", get(activity::list_activity))
        .layer(middleware::from_fn(admin_middleware));

    // Everything except /api/auth requires a valid bearer token.
    let protected = Router::new()
        .nest("/api/batches", batch_routes)
        .nest("/api/lessons", lesson_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/me", me_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .merge(protected)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
