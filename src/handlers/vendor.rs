use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::handlers::project::editable_project;
use crate::models::vendor::{EntryStatus, EntryType, ProjectEntry};
use crate::utils::auth::AuthUser;
use crate::utils::validation::{validate_not_blank, validate_payload};

const ENTRY_COLUMNS: &str = "entry_id, project_id, entry_type, vendor_name, contact_person, contact_email, \
     contact_phone, quote, status, document_links, created_at, updated_at";

#[derive(Deserialize)]
pub struct EntryQueryParams {
    project_id: Option<Uuid>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    project_id: Uuid,
    entry_type: EntryType,
    #[validate(length(min = 2, max = 100), custom = "validate_not_blank")]
    vendor_name: String,
    #[validate(length(max = 100))]
    contact_person: Option<String>,
    #[validate(email)]
    contact_email: Option<String>,
    #[validate(length(max = 32))]
    contact_phone: Option<String>,
    #[validate(range(min = 0.0))]
    quote: Option<f64>,
    status: Option<EntryStatus>,
    #[validate(custom = "validate_links")]
    #[serde(default)]
    document_links: Vec<String>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntryUpdate {
    entry_type: Option<EntryType>,
    #[validate(length(min = 2, max = 100), custom = "validate_not_blank")]
    vendor_name: Option<String>,
    #[validate(length(max = 100))]
    contact_person: Option<String>,
    #[validate(email)]
    contact_email: Option<String>,
    #[validate(length(max = 32))]
    contact_phone: Option<String>,
    #[validate(range(min = 0.0))]
    quote: Option<f64>,
    status: Option<EntryStatus>,
    #[validate(custom = "validate_links")]
    document_links: Option<Vec<String>>,
}

fn validate_links(links: &Vec<String>) -> Result<(), validator::ValidationError> {
    if links.len() > 20 {
        return Err(validator::ValidationError::new("too_many_links"));
    }
    if links.iter().any(|link| !validator::validate_url(link.as_str())) {
        return Err(validator::ValidationError::new("url"));
    }
    Ok(())
}

pub async fn entries_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<ProjectEntry>, AppError> {
    let sql = format!(
        "SELECT {} FROM project_vendors WHERE project_id = $1 ORDER BY created_at DESC",
        ENTRY_COLUMNS
    );
    let entries = sqlx::query_as::<_, ProjectEntry>(&sql)
        .bind(project_id)
        .fetch_all(pool)
        .await?;
    Ok(entries)
}

async fn entry_project_id(pool: &PgPool, entry_id: Uuid) -> Result<Uuid, AppError> {
    let project_id: Option<Uuid> = sqlx::query_scalar("SELECT project_id FROM project_vendors WHERE entry_id = $1")
        .bind(entry_id)
        .fetch_optional(pool)
        .await?;
    project_id.ok_or_else(|| AppError::NotFound("Project entry not found".to_string()))
}

pub async fn get_entries(
    _auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<EntryQueryParams>,
) -> Result<HttpResponse, AppError> {
    let entries = match query.project_id {
        Some(project_id) => entries_for_project(&pool, project_id).await?,
        None => {
            let sql = format!("SELECT {} FROM project_vendors ORDER BY created_at DESC", ENTRY_COLUMNS);
            sqlx::query_as::<_, ProjectEntry>(&sql).fetch_all(&**pool).await?
        }
    };
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn create_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    new_entry: web::Json<NewEntry>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&*new_entry)?;

    editable_project(&pool, &auth, new_entry.project_id).await?;

    let now = Utc::now();
    let sql = format!(
        "INSERT INTO project_vendors (entry_id, project_id, entry_type, vendor_name, contact_person, \
         contact_email, contact_phone, quote, status, document_links, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {}",
        ENTRY_COLUMNS
    );
    let entry = sqlx::query_as::<_, ProjectEntry>(&sql)
        .bind(Uuid::new_v4())
        .bind(new_entry.project_id)
        .bind(new_entry.entry_type.as_str())
        .bind(new_entry.vendor_name.trim())
        .bind(&new_entry.contact_person)
        .bind(&new_entry.contact_email)
        .bind(&new_entry.contact_phone)
        .bind(new_entry.quote)
        .bind(new_entry.status.unwrap_or(EntryStatus::Pending).as_str())
        .bind(&new_entry.document_links)
        .bind(now)
        .bind(now)
        .fetch_one(&**pool)
        .await?;

    Ok(HttpResponse::Created().json(entry))
}

pub async fn update_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    entry_id: web::Path<Uuid>,
    updates: web::Json<EntryUpdate>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&*updates)?;
    let entry_id = entry_id.into_inner();
    let project_id = entry_project_id(&pool, entry_id).await?;
    editable_project(&pool, &auth, project_id).await?;

    let mut query = sqlx::QueryBuilder::new("UPDATE project_vendors SET ");
    let mut separated = query.separated(", ");
    if let Some(entry_type) = updates.entry_type {
        separated.push("entry_type = ");
        separated.push_bind_unseparated(entry_type.as_str());
    }
    if let Some(vendor_name) = &updates.vendor_name {
        separated.push("vendor_name = ");
        separated.push_bind_unseparated(vendor_name.trim());
    }
    if let Some(contact_person) = &updates.contact_person {
        separated.push("contact_person = ");
        separated.push_bind_unseparated(contact_person);
    }
    if let Some(contact_email) = &updates.contact_email {
        separated.push("contact_email = ");
        separated.push_bind_unseparated(contact_email);
    }
    if let Some(contact_phone) = &updates.contact_phone {
        separated.push("contact_phone = ");
        separated.push_bind_unseparated(contact_phone);
    }
    if let Some(quote) = updates.quote {
        separated.push("quote = ");
        separated.push_bind_unseparated(quote);
    }
    if let Some(status) = updates.status {
        separated.push("status = ");
        separated.push_bind_unseparated(status.as_str());
    }
    if let Some(document_links) = &updates.document_links {
        separated.push("document_links = ");
        separated.push_bind_unseparated(document_links);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    query.push(" WHERE entry_id = ");
    query.push_bind(entry_id);
    query.push(" RETURNING ");
    query.push(ENTRY_COLUMNS);

    let entry = query
        .build_query_as::<ProjectEntry>()
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project entry not found".to_string()))?;

    Ok(HttpResponse::Ok().json(entry))
}

pub async fn delete_entry(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    entry_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let entry_id = entry_id.into_inner();
    let project_id = entry_project_id(&pool, entry_id).await?;
    editable_project(&pool, &auth, project_id).await?;

    let result = sqlx::query("DELETE FROM project_vendors WHERE entry_id = $1")
        .bind(entry_id)
        .execute(&**pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Project entry not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Project entry deleted successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_must_be_urls() {
        assert!(validate_links(&vec!["https://example.com/quote.pdf".to_string()]).is_ok());
        assert!(validate_links(&vec!["not a link".to_string()]).is_err());
        assert!(validate_links(&vec![]).is_ok());
    }
}
