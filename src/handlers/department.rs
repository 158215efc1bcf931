use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::errors::AppError;
use crate::models::department::Department;
use crate::utils::auth::AuthUser;
use crate::utils::validation::{validate_not_blank, validate_payload};

const DEPARTMENT_SELECT: &str = "SELECT d.department_id, d.name, d.description, \
     (SELECT COUNT(*) FROM users u WHERE u.department_id = d.department_id) AS employee_count, \
     d.created_at, d.updated_at \
     FROM departments d";

#[derive(Deserialize, Validate)]
pub struct NewDepartment {
    #[validate(length(min = 2, max = 64), custom = "validate_not_blank")]
    name: String,
    #[validate(length(max = 255))]
    description: Option<String>,
}

#[derive(Deserialize)]
pub struct DepartmentQueryParams {
    name: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct DepartmentUpdate {
    #[validate(length(min = 2, max = 64), custom = "validate_not_blank")]
    name: Option<String>,
    #[validate(length(max = 255))]
    description: Option<String>,
}

async fn name_taken(pool: &PgPool, name: &str, except: Option<Uuid>) -> Result<bool, AppError> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM departments WHERE LOWER(name) = LOWER($1) \
         AND ($2::UUID IS NULL OR department_id <> $2))",
    )
    .bind(name)
    .bind(except)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    new_department: web::Json<NewDepartment>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    validate_payload(&*new_department)?;

    let name = new_department.name.trim();
    if name_taken(&pool, name, None).await? {
        return Err(AppError::Conflict("Department name already exists".to_string()));
    }

    let now = Utc::now();
    let department = sqlx::query_as::<_, Department>(
        "INSERT INTO departments (department_id, name, description, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING department_id, name, description, 0::BIGINT AS employee_count, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&new_department.description)
    .bind(now)
    .bind(now)
    .fetch_one(&**pool)
    .await?;

    Ok(HttpResponse::Created().json(department))
}

pub async fn get_departments(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<DepartmentQueryParams>,
) -> Result<HttpResponse, AppError> {
    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> = sqlx::QueryBuilder::new(DEPARTMENT_SELECT);

    if let Some(name) = &query.name {
        query_builder.push(" WHERE d.name ILIKE ");
        query_builder.push_bind(db::contains_pattern(name));
        query_builder.push(" ESCAPE '\\'");
    }

    query_builder.push(" ORDER BY d.created_at DESC");

    if let Some(limit) = query.limit {
        query_builder.push(" LIMIT ");
        query_builder.push_bind(limit.max(0));
    }

    if let Some(offset) = query.offset {
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset.max(0));
    }

    let departments = query_builder
        .build_query_as::<Department>()
        .fetch_all(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(departments))
}

pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    department_id: web::Path<Uuid>,
    updates: web::Json<DepartmentUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    validate_payload(&*updates)?;
    let department_id = department_id.into_inner();

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM departments WHERE department_id = $1)")
        .bind(department_id)
        .fetch_one(&**pool)
        .await?;
    if !exists {
        return Err(AppError::NotFound("Department not found".to_string()));
    }

    if let Some(name) = &updates.name {
        if name_taken(&pool, name.trim(), Some(department_id)).await? {
            return Err(AppError::Conflict("Department name already exists".to_string()));
        }
    }

    let mut query = sqlx::QueryBuilder::new("UPDATE departments SET ");
    let mut separated = query.separated(", ");
    if let Some(name) = &updates.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name.trim());
    }
    if let Some(description) = &updates.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    query.push(" WHERE department_id = ");
    query.push_bind(department_id);

    query.build().execute(&**pool).await?;

    let sql = format!("{} WHERE d.department_id = $1", DEPARTMENT_SELECT);
    let department = sqlx::query_as::<_, Department>(&sql)
        .bind(department_id)
        .fetch_one(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(department))
}

pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    department_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let department_id = department_id.into_inner();

    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM departments WHERE department_id = $1)")
        .bind(department_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(AppError::NotFound("Department not found".to_string()));
    }

    let employees: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE department_id = $1")
        .bind(department_id)
        .fetch_one(&mut *tx)
        .await?;
    if employees > 0 {
        return Err(AppError::Conflict("Department still contains employees".to_string()));
    }

    sqlx::query("DELETE FROM departments WHERE department_id = $1")
        .bind(department_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Department deleted successfully",
    })))
}
