use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::errors::AppError;
use crate::handlers::task::{assigner_name, insert_task, TaskInput};
use crate::models::task::{Task, TaskStatus, TASK_COLUMNS};
use crate::models::user::{Employee, EmployeeWithTasks, Role, EMPLOYEE_SELECT};
use crate::utils::auth::AuthUser;
use crate::utils::password;
use crate::utils::validation::{validate_date_order, validate_not_blank, validate_payload};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewEmployee {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 64))]
    password: String,
    #[validate(length(min = 2, max = 64), custom = "validate_not_blank")]
    name: String,
    role: Option<Role>,
    #[validate(length(max = 100))]
    job_title: Option<String>,
    start_date: Option<NaiveDate>,
    #[validate(url)]
    avatar_uri: Option<String>,
    department_id: Option<Uuid>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmployeeUpdate {
    #[validate(email)]
    email: Option<String>,
    #[validate(length(min = 2, max = 64), custom = "validate_not_blank")]
    name: Option<String>,
    role: Option<Role>,
    #[validate(length(max = 100))]
    job_title: Option<String>,
    start_date: Option<NaiveDate>,
    #[validate(url)]
    avatar_uri: Option<String>,
    department_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct EmployeeQueryParams {
    name: Option<String>,
    department_id: Option<Uuid>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdate {
    task_id: Uuid,
    status: TaskStatus,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskUpdate {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    task_name: Option<String>,
    #[validate(length(max = 100))]
    project: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    remark: Option<String>,
    status: Option<TaskStatus>,
}

/// Attaches every employee's tasks, newest first.
pub async fn with_tasks(pool: &PgPool, employees: Vec<Employee>) -> Result<Vec<EmployeeWithTasks>, AppError> {
    let ids: Vec<Uuid> = employees.iter().map(|e| e.user_id).collect();
    let sql = format!(
        "SELECT {} FROM tasks WHERE user_id = ANY($1) ORDER BY created_at DESC",
        TASK_COLUMNS
    );
    let tasks = sqlx::query_as::<_, Task>(&sql)
        .bind(&ids)
        .fetch_all(pool)
        .await?;

    let mut by_owner: HashMap<Uuid, Vec<Task>> = HashMap::new();
    for task in tasks {
        by_owner.entry(task.user_id).or_default().push(task);
    }

    Ok(employees
        .into_iter()
        .map(|employee| {
            let tasks = by_owner.remove(&employee.user_id).unwrap_or_default();
            EmployeeWithTasks { employee, tasks }
        })
        .collect())
}

async fn fetch_employee(pool: &PgPool, user_id: Uuid) -> Result<Employee, AppError> {
    let sql = format!("{} WHERE u.user_id = $1", EMPLOYEE_SELECT);
    sqlx::query_as::<_, Employee>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".to_string()))
}

async fn fetch_task(pool: &PgPool, task_id: Uuid) -> Result<Task, AppError> {
    let sql = format!("SELECT {} FROM tasks WHERE task_id = $1", TASK_COLUMNS);
    sqlx::query_as::<_, Task>(&sql)
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
}

async fn list_employees(
    pool: &PgPool,
    name: Option<&str>,
    department_id: Option<Uuid>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<EmployeeWithTasks>, AppError> {
    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> = sqlx::QueryBuilder::new(EMPLOYEE_SELECT);
    query_builder.push(" WHERE TRUE");

    if let Some(name) = name {
        query_builder.push(" AND u.name ILIKE ");
        query_builder.push_bind(db::contains_pattern(name));
        query_builder.push(" ESCAPE '\\'");
    }
    if let Some(department_id) = department_id {
        query_builder.push(" AND u.department_id = ");
        query_builder.push_bind(department_id);
    }

    query_builder.push(" ORDER BY u.created_at DESC LIMIT ");
    query_builder.push_bind(limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT));
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset.unwrap_or(0).max(0));

    let employees = query_builder
        .build_query_as::<Employee>()
        .fetch_all(pool)
        .await?;

    with_tasks(pool, employees).await
}

pub async fn get_users(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<EmployeeQueryParams>,
) -> Result<HttpResponse, AppError> {
    let employees = list_employees(
        &pool,
        query.name.as_deref(),
        query.department_id,
        query.limit,
        query.offset,
    )
    .await?;

    Ok(HttpResponse::Ok().json(employees))
}

pub async fn get_users_by_department(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    department_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let employees = list_employees(&pool, None, Some(department_id.into_inner()), Some(MAX_LIMIT), None).await?;
    Ok(HttpResponse::Ok().json(employees))
}

pub async fn get_user(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let employee = fetch_employee(&pool, user_id.into_inner()).await?;
    let mut with = with_tasks(&pool, vec![employee]).await?;
    Ok(HttpResponse::Ok().json(with.remove(0)))
}

pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    new_employee: web::Json<NewEmployee>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    validate_payload(&*new_employee)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
        .bind(&new_employee.email)
        .fetch_one(&**pool)
        .await?;
    if exists {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    let password_hash = password::hash_password(&new_employee.password)?;
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (user_id, email, password, name, role, job_title, start_date, avatar_uri, \
         department_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(user_id)
    .bind(&new_employee.email)
    .bind(&password_hash)
    .bind(new_employee.name.trim())
    .bind(new_employee.role.unwrap_or(Role::Employee).as_str())
    .bind(&new_employee.job_title)
    .bind(new_employee.start_date)
    .bind(&new_employee.avatar_uri)
    .bind(new_employee.department_id)
    .bind(now)
    .bind(now)
    .execute(&**pool)
    .await?;

    let employee = fetch_employee(&pool, user_id).await?;
    Ok(HttpResponse::Created().json(EmployeeWithTasks {
        employee,
        tasks: Vec::new(),
    }))
}

pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
    updates: web::Json<EmployeeUpdate>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id.into_inner();
    auth.require_self_or_admin(user_id)?;
    if !auth.is_admin() && (updates.role.is_some() || updates.department_id.is_some()) {
        return Err(AppError::Forbidden("Only admins can change role or department".to_string()));
    }
    validate_payload(&*updates)?;

    fetch_employee(&pool, user_id).await?;

    if let Some(email) = &updates.email {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND user_id <> $2)",
        )
        .bind(email)
        .bind(user_id)
        .fetch_one(&**pool)
        .await?;
        if taken {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }
    }

    let mut query = sqlx::QueryBuilder::new("UPDATE users SET ");
    let mut separated = query.separated(", ");
    if let Some(email) = &updates.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }
    if let Some(name) = &updates.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name.trim());
    }
    if let Some(role) = updates.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role.as_str());
    }
    if let Some(job_title) = &updates.job_title {
        separated.push("job_title = ");
        separated.push_bind_unseparated(job_title);
    }
    if let Some(start_date) = updates.start_date {
        separated.push("start_date = ");
        separated.push_bind_unseparated(start_date);
    }
    if let Some(avatar_uri) = &updates.avatar_uri {
        separated.push("avatar_uri = ");
        separated.push_bind_unseparated(avatar_uri);
    }
    if let Some(department_id) = updates.department_id {
        separated.push("department_id = ");
        separated.push_bind_unseparated(department_id);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    query.push(" WHERE user_id = ");
    query.push_bind(user_id);

    query.build().execute(&**pool).await?;

    let employee = fetch_employee(&pool, user_id).await?;
    let mut with = with_tasks(&pool, vec![employee]).await?;
    Ok(HttpResponse::Ok().json(with.remove(0)))
}

pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let user_id = user_id.into_inner();
    if user_id == auth.user_id {
        return Err(AppError::Conflict("Cannot delete your own account".to_string()));
    }

    // Tasks and notifications go with the user (ON DELETE CASCADE).
    let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
        .bind(user_id)
        .execute(&**pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Employee deleted successfully",
    })))
}

pub async fn create_user_task(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
    input: web::Json<TaskInput>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    input.check()?;
    let user_id = user_id.into_inner();

    fetch_employee(&pool, user_id).await?;
    let assigned_by = assigner_name(&pool, auth.user_id).await?;

    let mut tx = pool.begin().await?;
    let task = insert_task(&mut tx, user_id, &input, assigned_by.as_deref()).await?;
    tx.commit().await?;

    Ok(HttpResponse::Created().json(task))
}

/// Inline status change from the task table.
pub async fn update_user_task_status(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
    body: web::Json<TaskStatusUpdate>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id.into_inner();
    auth.require_self_or_admin(user_id)?;

    let task = fetch_task(&pool, body.task_id).await?;
    if task.user_id != user_id {
        return Err(AppError::NotFound("Task not found".to_string()));
    }

    let sql = format!(
        "UPDATE tasks SET status = $1, updated_at = $2 WHERE task_id = $3 RETURNING {}",
        TASK_COLUMNS
    );
    let task = sqlx::query_as::<_, Task>(&sql)
        .bind(body.status.as_str())
        .bind(Utc::now())
        .bind(body.task_id)
        .fetch_one(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(task))
}

pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
    updates: web::Json<TaskUpdate>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&*updates)?;
    let task_id = task_id.into_inner();

    let existing = fetch_task(&pool, task_id).await?;
    auth.require_self_or_admin(existing.user_id)?;
    validate_date_order(
        updates.start_date.or(existing.start_date),
        updates.end_date.or(existing.end_date),
    )?;

    let mut query = sqlx::QueryBuilder::new("UPDATE tasks SET ");
    let mut separated = query.separated(", ");
    if let Some(task_name) = &updates.task_name {
        separated.push("task_name = ");
        separated.push_bind_unseparated(task_name.trim());
    }
    if let Some(project) = &updates.project {
        separated.push("project = ");
        separated.push_bind_unseparated(project);
    }
    if let Some(start_date) = updates.start_date {
        separated.push("start_date = ");
        separated.push_bind_unseparated(start_date);
    }
    if let Some(end_date) = updates.end_date {
        separated.push("end_date = ");
        separated.push_bind_unseparated(end_date);
        if Some(end_date) != existing.end_date {
            // A new deadline earns a fresh overdue notice.
            separated.push("overdue_notified = FALSE");
        }
    }
    if let Some(remark) = &updates.remark {
        separated.push("remark = ");
        separated.push_bind_unseparated(remark);
    }
    if let Some(status) = updates.status {
        separated.push("status = ");
        separated.push_bind_unseparated(status.as_str());
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    query.push(" WHERE task_id = ");
    query.push_bind(task_id);
    query.push(" RETURNING ");
    query.push(TASK_COLUMNS);

    let task = query
        .build_query_as::<Task>()
        .fetch_one(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(task))
}

pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM tasks WHERE task_id = $1")
        .bind(task_id.into_inner())
        .execute(&**pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Task not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Task deleted successfully",
    })))
}
