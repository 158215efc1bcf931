use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

text_enum! {
    /// Lifecycle state of a task.
    TaskStatus {
        Pending => "pending",
        InProgress => "in-progress",
        Completed => "completed",
        Blocked => "blocked",
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub task_name: String,
    pub project: Option<String>,
    pub assigned_by: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub remark: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task joined with its owner and the owner's department, as used by the
/// dashboard statistics and exports. `status` is kept as stored text.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub employee_name: String,
    pub department_id: Option<Uuid>,
    pub department_name: Option<String>,
    pub task_name: String,
    pub project: Option<String>,
    pub assigned_by: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub remark: Option<String>,
    pub status: String,
}

pub const TASK_COLUMNS: &str = "task_id, user_id, task_name, project, assigned_by, start_date, \
     end_date, remark, status, created_at, updated_at";

pub const TASK_ROW_SELECT: &str = "SELECT t.task_id, t.user_id, u.name AS employee_name, \
     u.department_id, d.name AS department_name, t.task_name, t.project, t.assigned_by, \
     t.start_date, t.end_date, t.remark, t.status \
     FROM tasks t \
     JOIN users u ON u.user_id = t.user_id \
     LEFT JOIN departments d ON d.department_id = u.department_id";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_hyphenated_wire_names() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in-progress\"");
        let parsed: TaskStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(parsed, TaskStatus::Blocked);
    }

    #[test]
    fn unknown_status_text_is_rejected() {
        let err = TaskStatus::try_from("done".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "unknown TaskStatus value 'done'");
        assert!(serde_json::from_str::<TaskStatus>("\"done\"").is_err());
    }
}
