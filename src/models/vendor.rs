use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

text_enum! {
    EntryType {
        Vendor => "vendor",
        Agency => "agency",
        Document => "document",
    }
}

text_enum! {
    EntryStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

/// A vendor, agency or document record attached to a project.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub entry_id: Uuid,
    pub project_id: Uuid,
    #[sqlx(try_from = "String")]
    pub entry_type: EntryType,
    pub vendor_name: String,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub quote: Option<f64>,
    #[sqlx(try_from = "String")]
    pub status: EntryStatus,
    pub document_links: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
