use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::errors::AppError;
use crate::handlers::vendor::entries_for_project;
use crate::models::project::{Project, ProjectStatus};
use crate::models::task::{TaskRow, TASK_ROW_SELECT};
use crate::stats::aggregate;
use crate::utils::auth::AuthUser;
use crate::utils::validation::{validate_not_blank, validate_payload};

const PROJECT_COLUMNS: &str = "project_id, name, description, status, created_by, created_at, updated_at";

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    #[validate(length(min = 2, max = 100), custom = "validate_not_blank")]
    name: String,
    #[validate(length(max = 1000))]
    description: Option<String>,
    status: Option<ProjectStatus>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectUpdate {
    #[validate(length(min = 2, max = 100), custom = "validate_not_blank")]
    name: Option<String>,
    #[validate(length(max = 1000))]
    description: Option<String>,
    status: Option<ProjectStatus>,
}

#[derive(Deserialize)]
pub struct ProjectQueryParams {
    name: Option<String>,
    status: Option<ProjectStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn fetch_project(pool: &PgPool, project_id: Uuid) -> Result<Project, AppError> {
    let sql = format!("SELECT {} FROM projects WHERE project_id = $1", PROJECT_COLUMNS);
    sqlx::query_as::<_, Project>(&sql)
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

fn require_owner_or_admin(auth: &AuthUser, project: &Project) -> Result<(), AppError> {
    if auth.is_admin() || project.created_by == Some(auth.user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only the project creator or an admin can do this".to_string()))
    }
}

/// Loads a project and checks the caller may change it or its entries.
pub async fn editable_project(pool: &PgPool, auth: &AuthUser, project_id: Uuid) -> Result<Project, AppError> {
    let project = fetch_project(pool, project_id).await?;
    require_owner_or_admin(auth, &project)?;
    Ok(project)
}

async fn name_taken(pool: &PgPool, name: &str, except: Option<Uuid>) -> Result<bool, AppError> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE LOWER(name) = LOWER($1) \
         AND ($2::UUID IS NULL OR project_id <> $2))",
    )
    .bind(name)
    .bind(except)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

pub async fn get_projects(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<ProjectQueryParams>,
) -> Result<HttpResponse, AppError> {
    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
        sqlx::QueryBuilder::new(format!("SELECT {} FROM projects WHERE TRUE", PROJECT_COLUMNS));

    if let Some(name) = &query.name {
        query_builder.push(" AND name ILIKE ");
        query_builder.push_bind(db::contains_pattern(name));
        query_builder.push(" ESCAPE '\\'");
    }
    if let Some(status) = query.status {
        query_builder.push(" AND status = ");
        query_builder.push_bind(status.as_str());
    }

    query_builder.push(" ORDER BY created_at DESC");

    if let Some(limit) = query.limit {
        query_builder.push(" LIMIT ");
        query_builder.push_bind(limit.max(0));
    }
    if let Some(offset) = query.offset {
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset.max(0));
    }

    let projects = query_builder
        .build_query_as::<Project>()
        .fetch_all(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(projects))
}

/// Project detail with its vendor/document entries and a task rollup.
pub async fn get_project(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    project_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let project = fetch_project(&pool, project_id.into_inner()).await?;
    let entries = entries_for_project(&pool, project.project_id).await?;

    let sql = format!("{} WHERE t.project = $1", TASK_ROW_SELECT);
    let tasks = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(&project.name)
        .fetch_all(&**pool)
        .await?;
    let now = Utc::now();

    Ok(HttpResponse::Ok().json(json!({
        "project": project,
        "entries": entries,
        "taskStats": aggregate::summarize(&tasks, now),
        "employees": aggregate::aggregate(&tasks, aggregate::GroupBy::Employee, now),
    })))
}

pub async fn create_project(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    new_project: web::Json<NewProject>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&*new_project)?;

    let name = new_project.name.trim();
    if name_taken(&pool, name, None).await? {
        return Err(AppError::Conflict("Project name already exists".to_string()));
    }

    let now = Utc::now();
    let sql = format!(
        "INSERT INTO projects (project_id, name, description, status, created_by, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
        PROJECT_COLUMNS
    );
    let project = sqlx::query_as::<_, Project>(&sql)
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&new_project.description)
        .bind(new_project.status.unwrap_or(ProjectStatus::Active).as_str())
        .bind(auth.user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&**pool)
        .await?;

    Ok(HttpResponse::Created().json(project))
}

pub async fn update_project(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    project_id: web::Path<Uuid>,
    updates: web::Json<ProjectUpdate>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&*updates)?;
    let existing = editable_project(&pool, &auth, project_id.into_inner()).await?;

    let new_name = updates.name.as_deref().map(str::trim);
    if let Some(name) = new_name {
        if name_taken(&pool, name, Some(existing.project_id)).await? {
            return Err(AppError::Conflict("Project name already exists".to_string()));
        }
    }

    let mut tx = pool.begin().await?;

    let mut query = sqlx::QueryBuilder::new("UPDATE projects SET ");
    let mut separated = query.separated(", ");
    if let Some(name) = new_name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }
    if let Some(description) = &updates.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }
    if let Some(status) = updates.status {
        separated.push("status = ");
        separated.push_bind_unseparated(status.as_str());
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    query.push(" WHERE project_id = ");
    query.push_bind(existing.project_id);
    query.push(" RETURNING ");
    query.push(PROJECT_COLUMNS);

    let project = query
        .build_query_as::<Project>()
        .fetch_one(&mut *tx)
        .await?;

    // Tasks refer to projects by name.
    if let Some(name) = new_name {
        if name != existing.name {
            sqlx::query("UPDATE tasks SET project = $1 WHERE project = $2")
                .bind(name)
                .bind(&existing.name)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(project))
}

pub async fn delete_project(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    project_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let project = editable_project(&pool, &auth, project_id.into_inner()).await?;

    // Vendor entries cascade; tasks keep the project name as plain text.
    sqlx::query("DELETE FROM projects WHERE project_id = $1")
        .bind(project.project_id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Project deleted successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;
    use assert_matches::assert_matches;

    fn project(created_by: Option<Uuid>) -> Project {
        Project {
            project_id: Uuid::new_v4(),
            name: "Apollo".to_string(),
            description: None,
            status: ProjectStatus::Active,
            created_by,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn creator_and_admins_may_edit() {
        let creator = AuthUser { user_id: Uuid::new_v4(), role: Role::Employee };
        let admin = AuthUser { user_id: Uuid::new_v4(), role: Role::Admin };
        let owned = project(Some(creator.user_id));
        assert!(require_owner_or_admin(&creator, &owned).is_ok());
        assert!(require_owner_or_admin(&admin, &owned).is_ok());
        assert!(require_owner_or_admin(&admin, &project(None)).is_ok());
    }

    #[test]
    fn other_employees_may_not_edit() {
        let stranger = AuthUser { user_id: Uuid::new_v4(), role: Role::Employee };
        assert_matches!(
            require_owner_or_admin(&stranger, &project(Some(Uuid::new_v4()))),
            Err(AppError::Forbidden(_))
        );
        assert_matches!(
            require_owner_or_admin(&stranger, &project(None)),
            Err(AppError::Forbidden(_))
        );
    }
}
