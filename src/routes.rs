use actix_web::web;

use crate::errors::AppError;
use crate::handlers;

/// Registers every `/api` route. Literal segments are registered before
/// the `{id}` resources that would otherwise shadow them.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|_err, _req| AppError::BadRequest("Invalid ID".to_string()).into()),
    )
    .service(
        web::scope("/api")
            // auth
            .service(
                web::resource("/auth")
                    .route(web::post().to(handlers::auth::auth_handler)),
            )
            .service(
                web::resource("/auth/me")
                    .route(web::get().to(handlers::auth::get_current_user)),
            )
            .service(
                web::resource("/auth/reset-password")
                    .route(web::post().to(handlers::auth::reset_password)),
            )
            // departments
            .service(
                web::resource("/departments")
                    .route(web::get().to(handlers::department::get_departments))
                    .route(web::post().to(handlers::department::create_department)),
            )
            .service(
                web::resource("/departments/{id}")
                    .route(web::put().to(handlers::department::update_department))
                    .route(web::delete().to(handlers::department::delete_department)),
            )
            // users and their tasks
            .service(
                web::resource("/users")
                    .route(web::get().to(handlers::user::get_users))
                    .route(web::post().to(handlers::user::create_user)),
            )
            .service(
                web::resource("/users/department/{id}")
                    .route(web::get().to(handlers::user::get_users_by_department)),
            )
            .service(
                web::resource("/users/update-task/{task_id}")
                    .route(web::put().to(handlers::user::update_task)),
            )
            .service(
                web::resource("/users/delete-task/{task_id}")
                    .route(web::delete().to(handlers::user::delete_task)),
            )
            .service(
                web::resource("/users/{id}/tasks")
                    .route(web::post().to(handlers::user::create_user_task))
                    .route(web::put().to(handlers::user::update_user_task_status)),
            )
            .service(
                web::resource("/users/{id}")
                    .route(web::get().to(handlers::user::get_user))
                    .route(web::put().to(handlers::user::update_user))
                    .route(web::delete().to(handlers::user::delete_user)),
            )
            // tasks
            .service(
                web::resource("/tasks")
                    .route(web::get().to(handlers::task::get_tasks)),
            )
            .service(
                web::resource("/tasks/stats")
                    .route(web::get().to(handlers::task::get_task_stats)),
            )
            .service(
                web::resource("/tasks/bulk")
                    .route(web::post().to(handlers::task::bulk_assign)),
            )
            .service(
                web::resource("/tasks/import")
                    .route(web::post().to(handlers::task::import_tasks)),
            )
            .service(
                web::resource("/tasks/export/excel")
                    .route(web::get().to(handlers::task::export_excel)),
            )
            .service(
                web::resource("/tasks/export/csv")
                    .route(web::get().to(handlers::task::export_csv)),
            )
            // projects
            .service(
                web::resource("/projects")
                    .route(web::get().to(handlers::project::get_projects))
                    .route(web::post().to(handlers::project::create_project)),
            )
            .service(
                web::resource("/projects/{id}")
                    .route(web::get().to(handlers::project::get_project))
                    .route(web::put().to(handlers::project::update_project))
                    .route(web::delete().to(handlers::project::delete_project)),
            )
            .service(
                web::resource("/project-vendors")
                    .route(web::get().to(handlers::vendor::get_entries))
                    .route(web::post().to(handlers::vendor::create_entry)),
            )
            .service(
                web::resource("/project-vendors/{id}")
                    .route(web::put().to(handlers::vendor::update_entry))
                    .route(web::delete().to(handlers::vendor::delete_entry)),
            )
            // notifications
            .service(
                web::resource("/notifications")
                    .route(web::get().to(handlers::notification::get_notifications))
                    .route(web::post().to(handlers::notification::create_notification)),
            )
            .service(
                web::resource("/notifications/unread-count")
                    .route(web::get().to(handlers::notification::get_unread_count)),
            )
            .service(
                web::resource("/notifications/read-all")
                    .route(web::put().to(handlers::notification::mark_all_read)),
            )
            .service(
                web::resource("/notifications/{id}/read")
                    .route(web::put().to(handlers::notification::mark_read)),
            )
            .service(
                web::resource("/notifications/{id}")
                    .route(web::delete().to(handlers::notification::delete_notification)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::user::Role;
    use crate::utils::jwt;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use uuid::Uuid;

    // Requests in these tests are rejected before any query runs, so the
    // pool never has to reach a server.
    fn lazy_pool() -> sqlx::PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://localhost/taskdesk_unused")
            .unwrap()
    }

    fn bearer(role: Role) -> String {
        let config = Config::for_tests();
        let token = jwt::generate_token(Uuid::new_v4(), role, &config.jwt_secret, 1).unwrap();
        format!("Bearer {}", token)
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool()))
                    .app_data(web::Data::new(Config::for_tests()))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_token_is_rejected() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/tasks").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing token");
    }

    #[actix_web::test]
    async fn forged_token_is_rejected() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/notifications")
            .insert_header(("Authorization", "Bearer not.a.jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn employees_cannot_create_departments() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/departments")
            .insert_header(("Authorization", bearer(Role::Employee)))
            .set_json(serde_json::json!({ "name": "Finance" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn short_department_name_fails_validation() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/departments")
            .insert_header(("Authorization", bearer(Role::Admin)))
            .set_json(serde_json::json!({ "name": "x" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Validation failed: name: [length]");
    }

    #[actix_web::test]
    async fn unknown_auth_action_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/auth")
            .set_json(serde_json::json!({
                "email": "manager@example.com",
                "password": "password123",
                "action": "delete",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn unknown_task_status_in_body_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::put()
            .uri(&format!("/api/users/{}/tasks", Uuid::new_v4()))
            .insert_header(("Authorization", bearer(Role::Admin)))
            .set_json(serde_json::json!({ "taskId": Uuid::new_v4(), "status": "done" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn reversed_task_dates_are_rejected() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri(&format!("/api/users/{}/tasks", Uuid::new_v4()))
            .insert_header(("Authorization", bearer(Role::Admin)))
            .set_json(serde_json::json!({
                "taskName": "Quarterly audit",
                "startDate": "2024-05-10",
                "endDate": "2024-05-01",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn malformed_id_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/users/not-a-uuid")
            .insert_header(("Authorization", bearer(Role::Admin)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn conflicting_task_window_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/tasks/stats?week_offset=1&from=2024-01-01&to=2024-01-07")
            .insert_header(("Authorization", bearer(Role::Admin)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn week_offset_outside_the_calendar_is_bad_request() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/tasks?week_offset=100000000")
            .insert_header(("Authorization", bearer(Role::Employee)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "week_offset out of range");
    }

    #[actix_web::test]
    async fn employees_cannot_register_admins() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/auth")
            .insert_header(("Authorization", bearer(Role::Employee)))
            .set_json(serde_json::json!({
                "email": "intruder@example.com",
                "password": "password123",
                "action": "create",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn exports_are_admin_only() {
        let app = app!();
        for uri in ["/api/tasks/export/excel", "/api/tasks/export/csv"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", bearer(Role::Employee)))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn import_dry_run_lists_extracted_lines() {
        let app = app!();
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"document\"; filename=\"plan.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n- Book venue\n2) Send invites\n\r\n--{b}--\r\n",
            b = boundary
        );
        let req = test::TestRequest::post()
            .uri(&format!("/api/tasks/import?employee_ids={}&dry_run=true", Uuid::new_v4()))
            .insert_header(("Authorization", bearer(Role::Admin)))
            .insert_header((
                "Content-Type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["lines"], serde_json::json!(["Book venue", "Send invites"]));
        assert_eq!(body["created"], 0);
    }

    #[actix_web::test]
    async fn import_rejects_oversized_document() {
        let app = app!();
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"document\"; filename=\"big.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n{text}\r\n--{b}--\r\n",
            b = boundary,
            text = "task line\n".repeat(20)
        );
        let req = test::TestRequest::post()
            .uri(&format!("/api/tasks/import?employee_ids={}&dry_run=true", Uuid::new_v4()))
            .insert_header(("Authorization", bearer(Role::Admin)))
            .insert_header((
                "Content-Type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
