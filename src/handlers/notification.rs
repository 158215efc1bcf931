use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::notification::{Notification, NotificationKind};
use crate::utils::auth::AuthUser;
use crate::utils::validation::validate_payload;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

const NOTIFICATION_COLUMNS: &str =
    "notification_id, recipient_id, message, kind, project_name, due_date, read, created_at";

#[derive(Deserialize)]
pub struct NotificationQueryParams {
    unread_only: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    recipient_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    message: String,
    #[validate(length(max = 100))]
    project_name: Option<String>,
    due_date: Option<NaiveDate>,
}

/// Inserts one notification. Runs on whatever executor the caller holds so
/// task writes and their notifications can share a transaction.
pub async fn insert_notification<'e, E>(
    executor: E,
    recipient_id: Uuid,
    message: &str,
    kind: NotificationKind,
    project_name: Option<&str>,
    due_date: Option<NaiveDate>,
) -> Result<Notification, AppError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "INSERT INTO notifications (notification_id, recipient_id, message, kind, project_name, due_date, read, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7) RETURNING {}",
        NOTIFICATION_COLUMNS
    );
    let notification = sqlx::query_as::<_, Notification>(&sql)
        .bind(Uuid::new_v4())
        .bind(recipient_id)
        .bind(message)
        .bind(kind.as_str())
        .bind(project_name)
        .bind(due_date)
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;
    Ok(notification)
}

pub async fn get_notifications(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<NotificationQueryParams>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM notifications WHERE recipient_id = ",
        NOTIFICATION_COLUMNS
    ));
    query_builder.push_bind(auth.user_id);
    if query.unread_only.unwrap_or(false) {
        query_builder.push(" AND NOT read");
    }
    query_builder.push(" ORDER BY created_at DESC LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    let notifications = query_builder
        .build_query_as::<Notification>()
        .fetch_all(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(notifications))
}

pub async fn get_unread_count(
    auth: AuthUser,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT read",
    )
    .bind(auth.user_id)
    .fetch_one(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

pub async fn create_notification(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    new_notification: web::Json<NewNotification>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    validate_payload(&*new_notification)?;

    let notification = insert_notification(
        &**pool,
        new_notification.recipient_id,
        new_notification.message.trim(),
        NotificationKind::General,
        new_notification.project_name.as_deref(),
        new_notification.due_date,
    )
    .await?;

    Ok(HttpResponse::Created().json(notification))
}

pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    notification_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let notification_id = notification_id.into_inner();
    let result = sqlx::query(
        "UPDATE notifications SET read = TRUE WHERE notification_id = $1 AND recipient_id = $2",
    )
    .bind(notification_id)
    .bind(auth.user_id)
    .execute(&**pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "notificationId": notification_id,
        "read": true,
    })))
}

pub async fn mark_all_read(
    auth: AuthUser,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND NOT read")
        .bind(auth.user_id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "markedRead": result.rows_affected() })))
}

pub async fn delete_notification(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    notification_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let result = sqlx::query("DELETE FROM notifications WHERE notification_id = $1 AND recipient_id = $2")
        .bind(notification_id.into_inner())
        .bind(auth.user_id)
        .execute(&**pool)
        .await?;

    // Someone else's notification looks the same as a missing one.
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Notification deleted successfully",
    })))
}
