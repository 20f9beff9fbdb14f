// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{
        answers, attempts, auth, groups, questions, students, subjects, teachers, topics, users,
    },
    state::AppState,
    utils::jwt::{auth_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * `/api/auth/login` is public; every other route requires a bearer token.
/// * Teacher-only routes sit behind `teacher_middleware`, inside `auth_middleware`.
/// * Mixed routes check the caller's role in the handler.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route(
            "/{id}",
            get(users::get_user)
                .put(users::update_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route_layer(middleware::from_fn(teacher_middleware));

    let teacher_routes = Router::new()
        .route("/", get(teachers::list_teachers))
        .route(
            "/{id}",
            get(teachers::get_teacher)
                .put(teachers::update_teacher)
                .patch(teachers::update_teacher),
        )
        .route_layer(middleware::from_fn(teacher_middleware));

    let student_routes = Router::new()
        .route("/me-assignments", get(students::my_assignments))
        .merge(
            Router::new()
                .route("/", get(students::list_students))
                .route(
                    "/{id}",
                    get(students::get_student)
                        .put(students::update_student)
                        .patch(students::update_student),
                )
                .route_layer(middleware::from_fn(teacher_middleware)),
        );

    let subject_routes = Router::new()
        .route("/", get(subjects::list_subjects))
        .route("/{id}", get(subjects::get_subject))
        .route("/{id}/groups", get(subjects::subject_groups))
        // Writes: teachers only
        .merge(
            Router::new()
                .route("/", post(subjects::create_subject))
                .route(
                    "/{id}",
                    put(subjects::update_subject)
                        .patch(subjects::update_subject)
                        .delete(subjects::delete_subject),
                )
                .route_layer(middleware::from_fn(teacher_middleware)),
        );

    let topic_routes = Router::new()
        .route("/", get(topics::list_topics))
        .route("/{id}", get(topics::get_topic))
        .merge(
            Router::new()
                .route("/", post(topics::create_topic))
                .route(
                    "/{id}",
                    put(topics::update_topic)
                        .patch(topics::update_topic)
                        .delete(topics::delete_topic),
                )
                .route_layer(middleware::from_fn(teacher_middleware)),
        );

    let question_routes = Router::new()
        .route(
            "/",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/{id}",
            get(questions::get_question)
                .put(questions::update_question)
                .patch(questions::update_question)
                .delete(questions::delete_question),
        )
        .route_layer(middleware::from_fn(teacher_middleware));

    let group_routes = Router::new()
        .route("/", get(groups::list_groups).post(groups::create_group))
        .route(
            "/{id}",
            get(groups::get_group)
                .put(groups::update_group)
                .patch(groups::update_group)
                .delete(groups::delete_group),
        )
        .route(
            "/{id}/teacher-assignment",
            get(groups::get_teacher_assignment)
                .put(groups::write_teacher_assignment)
                .patch(groups::write_teacher_assignment)
                .delete(groups::delete_teacher_assignment),
        )
        .route("/{id}/search-students", get(groups::search_students))
        .route("/{id}/find-student", get(groups::find_student))
        .route("/{id}/add-student", post(groups::add_student))
        .route("/{id}/remove-student", post(groups::remove_student));

    let attempt_routes = Router::new()
        .route(
            "/",
            get(attempts::list_attempts).post(attempts::create_attempt),
        )
        .route(
            "/{id}",
            get(attempts::get_attempt)
                .patch(attempts::update_attempt)
                .delete(attempts::delete_attempt),
        );

    let attempt_question_routes = Router::new()
        .route("/", get(attempts::list_attempt_questions))
        .route("/{id}", get(attempts::get_attempt_question))
        .route("/{id}/answer", put(attempts::submit_answer));

    let answer_routes = Router::new()
        .route("/", get(answers::list_answers))
        .route(
            "/{id}",
            get(answers::get_answer).patch(answers::review_answer),
        );

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .nest("/user", user_routes)
        .nest("/teacher", teacher_routes)
        .nest("/student", student_routes)
        .nest("/subject", subject_routes)
        .nest("/topic", topic_routes)
        .nest("/question", question_routes)
        .nest("/group", group_routes)
        .nest("/attempt", attempt_routes)
        .nest("/attempt_question", attempt_question_routes)
        .nest("/answer", answer_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .merge(protected);

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
