use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::task::Task;

text_enum! {
    Role {
        Admin => "admin",
        Employee => "employee",
    }
}

#[derive(sqlx::FromRow, Debug)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

/// Employee profile as returned by the API, without credentials.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub job_title: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub avatar_uri: Option<String>,
    pub department_id: Option<Uuid>,
    pub department_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone)]
pub struct EmployeeWithTasks {
    #[serde(flatten)]
    pub employee: Employee,
    pub tasks: Vec<Task>,
}

pub const EMPLOYEE_SELECT: &str = "SELECT u.user_id, u.email, u.name, u.role, u.job_title, \
     u.start_date, u.avatar_uri, u.department_id, d.name AS department_name, u.created_at, \
     u.updated_at \
     FROM users u \
     LEFT JOIN departments d ON d.department_id = u.department_id";
