use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Local, NaiveDate, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::errors::AppError;
use crate::handlers::notification::insert_notification;
use crate::handlers::user::with_tasks;
use crate::models::notification::NotificationKind;
use crate::models::task::{Task, TaskRow, TaskStatus, TASK_COLUMNS, TASK_ROW_SELECT};
use crate::models::user::{Employee, EMPLOYEE_SELECT};
use crate::stats::aggregate::{self, GroupBy};
use crate::stats::export;
use crate::stats::filter::{self, DateWindow, TaskFilter};
use crate::stats::import;
use crate::utils::auth::AuthUser;
use crate::utils::validation::{validate_date_order, validate_not_blank, validate_payload};

const DOCUMENT_FIELD: &str = "document";
const MAX_RECIPIENTS: usize = 500;

/// Fields shared by single, bulk and imported task creation.
#[derive(Deserialize, Validate, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub task_name: String,
    #[validate(length(max = 100))]
    pub project: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub remark: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskInput {
    pub fn check(&self) -> Result<(), AppError> {
        validate_payload(self)?;
        validate_date_order(self.start_date, self.end_date)
    }
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignRequest {
    #[validate(length(min = 1, max = 500))]
    employee_ids: Vec<Uuid>,
    #[serde(flatten)]
    #[validate]
    task: TaskInput,
}

#[derive(Deserialize, Default)]
pub struct TaskQueryParams {
    status: Option<TaskStatus>,
    project: Option<String>,
    employee_id: Option<Uuid>,
    department_id: Option<Uuid>,
    week_offset: Option<i64>,
    from: Option<String>,
    to: Option<String>,
    today: Option<String>,
    overdue: Option<bool>,
    group_by: Option<GroupBy>,
}

#[derive(Deserialize)]
pub struct ImportParams {
    employee_ids: String,
    project: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    dry_run: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskListItem {
    #[serde(flatten)]
    task: TaskRow,
    is_overdue: bool,
}

fn parse_query_date(raw: &str, field: &str) -> Result<NaiveDate, AppError> {
    filter::parse_date(raw).ok_or_else(|| AppError::BadRequest(format!("Invalid {} date", field)))
}

/// Turns query parameters into a filter. Employees are always pinned to
/// their own tasks.
fn build_filter(params: &TaskQueryParams, auth: &AuthUser, today: NaiveDate) -> Result<TaskFilter, AppError> {
    let explicit = match (&params.from, &params.to) {
        (Some(from), Some(to)) => {
            let from = parse_query_date(from, "from")?;
            let to = parse_query_date(to, "to")?;
            Some(
                DateWindow::new(from, to)
                    .ok_or_else(|| AppError::BadRequest("from must not be after to".to_string()))?,
            )
        }
        (None, None) => None,
        _ => return Err(AppError::BadRequest("from and to must be provided together".to_string())),
    };

    let window = match (explicit, params.week_offset) {
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest("Use either week_offset or from/to, not both".to_string()))
        }
        (Some(window), None) => Some(window),
        (None, Some(offset)) => Some(
            filter::week_window(today, offset)
                .ok_or_else(|| AppError::BadRequest("week_offset out of range".to_string()))?,
        ),
        (None, None) => None,
    };

    let employee_id = if auth.is_admin() {
        params.employee_id
    } else {
        Some(auth.user_id)
    };

    Ok(TaskFilter {
        status: params.status.map(|s| s.as_str().to_string()),
        project: params.project.clone(),
        employee_id,
        department_id: params.department_id,
        window,
        overdue_only: params.overdue.unwrap_or(false),
    })
}

fn resolve_today(params: &TaskQueryParams) -> Result<NaiveDate, AppError> {
    match &params.today {
        Some(raw) => parse_query_date(raw, "today"),
        None => Ok(Local::now().date_naive()),
    }
}

async fn fetch_task_rows(pool: &PgPool, auth: &AuthUser) -> Result<Vec<TaskRow>, AppError> {
    let mut query_builder: sqlx::QueryBuilder<'_, Postgres> = sqlx::QueryBuilder::new(TASK_ROW_SELECT);
    if !auth.is_admin() {
        query_builder.push(" WHERE t.user_id = ");
        query_builder.push_bind(auth.user_id);
    }
    query_builder.push(" ORDER BY t.start_date DESC NULLS LAST, t.created_at DESC");

    let rows = query_builder
        .build_query_as::<TaskRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

async fn filtered_rows(
    pool: &PgPool,
    auth: &AuthUser,
    params: &TaskQueryParams,
    now: DateTime<Utc>,
) -> Result<(Vec<TaskRow>, Option<DateWindow>), AppError> {
    let today = resolve_today(params)?;
    let task_filter = build_filter(params, auth, today)?;
    let rows = fetch_task_rows(pool, auth).await?;
    Ok((task_filter.apply(rows, now), task_filter.window))
}

pub async fn assigner_name(pool: &PgPool, user_id: Uuid) -> Result<Option<String>, AppError> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(name)
}

/// Creates one task for `user_id` and tells them about it, inside the
/// caller's transaction.
pub async fn insert_task(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    input: &TaskInput,
    assigned_by: Option<&str>,
) -> Result<Task, AppError> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO tasks (task_id, user_id, task_name, project, assigned_by, start_date, end_date, \
         remark, status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING {}",
        TASK_COLUMNS
    );
    let task = sqlx::query_as::<_, Task>(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(input.task_name.trim())
        .bind(&input.project)
        .bind(assigned_by)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(&input.remark)
        .bind(input.status.unwrap_or(TaskStatus::Pending).as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

    insert_notification(
        &mut **tx,
        user_id,
        &format!("New task assigned: {}", task.task_name),
        NotificationKind::TaskAssigned,
        task.project.as_deref(),
        task.end_date,
    )
    .await?;

    Ok(task)
}

/// Assigns every input to every employee in one transaction. Either all
/// tasks are created or none are.
async fn assign_all(
    pool: &PgPool,
    employee_ids: &[Uuid],
    inputs: &[TaskInput],
    assigned_by: Option<&str>,
) -> Result<Vec<Task>, AppError> {
    let mut ids = employee_ids.to_vec();
    ids.sort();
    ids.dedup();

    let mut tx = pool.begin().await?;

    let found: Vec<Uuid> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ANY($1)")
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !found.contains(id))
        .map(Uuid::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::NotFound(format!("Employees not found: {}", missing.join(", "))));
    }

    let mut created = Vec::with_capacity(ids.len() * inputs.len());
    for input in inputs {
        for user_id in &ids {
            created.push(insert_task(&mut tx, *user_id, input, assigned_by).await?);
        }
    }
    tx.commit().await?;

    log::info!(
        "Assigned {} task(s) to {} employee(s)",
        inputs.len(),
        ids.len()
    );
    Ok(created)
}

pub async fn get_tasks(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<TaskQueryParams>,
) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let (rows, _) = filtered_rows(&pool, &auth, &query, now).await?;

    let items: Vec<TaskListItem> = rows
        .into_iter()
        .map(|task| TaskListItem {
            is_overdue: task.is_overdue(now),
            task,
        })
        .collect();

    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_task_stats(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<TaskQueryParams>,
) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let group_by = query.group_by.unwrap_or_default();
    let (rows, window) = filtered_rows(&pool, &auth, &query, now).await?;

    Ok(HttpResponse::Ok().json(json!({
        "overall": aggregate::summarize(&rows, now),
        "groups": aggregate::aggregate(&rows, group_by, now),
        "window": window.map(|w| json!({ "start": w.start, "end": w.end })),
    })))
}

pub async fn bulk_assign(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    body: web::Json<BulkAssignRequest>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    validate_payload(&*body)?;
    body.task.check()?;

    let assigned_by = assigner_name(&pool, auth.user_id).await?;
    let tasks = assign_all(
        &pool,
        &body.employee_ids,
        std::slice::from_ref(&body.task),
        assigned_by.as_deref(),
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "created": tasks.len(),
        "tasks": tasks,
    })))
}

fn parse_employee_ids(raw: &str) -> Result<Vec<Uuid>, AppError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).map_err(|_| AppError::BadRequest(format!("Invalid employee ID {}", s))))
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(AppError::BadRequest("employee_ids must name at least one employee".to_string()));
    }
    if ids.len() > MAX_RECIPIENTS {
        return Err(AppError::BadRequest(format!(
            "employee_ids may name at most {} employees",
            MAX_RECIPIENTS
        )));
    }
    Ok(ids)
}

/// Reads the `document` part of a multipart upload, refusing to buffer more
/// than `limit + 1` bytes.
async fn read_document_part(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, AppError> {
    let bad_upload = |err: actix_multipart::MultipartError| AppError::BadRequest(format!("Invalid upload: {}", err));

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(bad_upload)?;
        if field.name() != DOCUMENT_FIELD {
            continue;
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(bad_upload)?;
            if bytes.len() + chunk.len() > limit {
                bytes.extend_from_slice(&chunk[..(limit + 1 - bytes.len()).min(chunk.len())]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(bytes);
    }
    Err(AppError::BadRequest(format!("Missing '{}' file part", DOCUMENT_FIELD)))
}

/// Turns each line of an uploaded text document into a task for every
/// listed employee. `dry_run=true` only reports the extracted lines.
pub async fn import_tasks(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    params: web::Query<ImportParams>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let employee_ids = parse_employee_ids(&params.employee_ids)?;
    validate_date_order(params.start_date, params.end_date)?;

    let bytes = read_document_part(payload, config.max_import_bytes).await?;
    let text = import::read_document(&bytes, config.max_import_bytes)?;
    let lines = import::task_lines(&text)?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("No task lines found in document".to_string()));
    }

    if params.dry_run.unwrap_or(false) {
        return Ok(HttpResponse::Ok().json(json!({
            "lines": lines,
            "created": 0,
        })));
    }

    let inputs: Vec<TaskInput> = lines
        .iter()
        .map(|line| TaskInput {
            task_name: line.clone(),
            project: params.project.clone(),
            start_date: params.start_date,
            end_date: params.end_date,
            remark: None,
            status: None,
        })
        .collect();

    let assigned_by = assigner_name(&pool, auth.user_id).await?;
    let tasks = assign_all(&pool, &employee_ids, &inputs, assigned_by.as_deref()).await?;

    Ok(HttpResponse::Created().json(json!({
        "lines": lines,
        "created": tasks.len(),
        "tasks": tasks,
    })))
}

async fn export_rows(pool: &PgPool) -> Result<Vec<export::ExportRow>, AppError> {
    let sql = format!("{} ORDER BY u.name", EMPLOYEE_SELECT);
    let employees = sqlx::query_as::<_, Employee>(&sql).fetch_all(pool).await?;
    let employees = with_tasks(pool, employees).await?;
    Ok(export::flatten(&employees, Utc::now()))
}

fn attachment(name: &str, extension: &str) -> String {
    format!(
        "attachment; filename=\"{}-{}.{}\"",
        name,
        Local::now().format("%Y-%m-%d"),
        extension
    )
}

pub async fn export_excel(
    auth: AuthUser,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let rows = export_rows(&pool).await?;
    let workbook = export::to_xlsx(&rows)?;

    Ok(HttpResponse::Ok()
        .content_type("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        .insert_header(("Content-Disposition", attachment("tasks", "xlsx")))
        .body(workbook))
}

pub async fn export_csv(
    auth: AuthUser,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let rows = export_rows(&pool).await?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(("Content-Disposition", attachment("tasks", "csv")))
        .body(export::to_csv(&rows)))
}
