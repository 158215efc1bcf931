use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::models::task::{Task, TaskRow, TaskStatus};

/// A task is overdue when it is not completed and its end date (taken as
/// midnight UTC) lies before `now`. Tasks without an end date never are.
pub fn is_overdue(status: &str, end_date: Option<NaiveDate>, now: DateTime<Utc>) -> bool {
    if status == TaskStatus::Completed.as_str() {
        return false;
    }
    match end_date {
        Some(end) => end.and_time(NaiveTime::MIN).and_utc() < now,
        None => false,
    }
}

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        is_overdue(self.status.as_str(), self.end_date, now)
    }
}

impl TaskRow {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        is_overdue(&self.status, self.end_date, now)
    }
}
