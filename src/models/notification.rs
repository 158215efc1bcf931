use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

text_enum! {
    NotificationKind {
        TaskAssigned => "task_assigned",
        TaskOverdue => "task_overdue",
        General => "general",
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: Uuid,
    pub recipient_id: Uuid,
    pub message: String,
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub project_name: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
