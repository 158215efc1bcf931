use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::task::TaskRow;

/// Inclusive calendar-date range. An end date covers the whole day, so this
/// is the same window as `[start 00:00, end 23:59:59.999]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Returns `None` when `end` precedes `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(DateWindow { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Sunday-to-Saturday week containing `today`, shifted back `offset` weeks.
/// `offset = 0` is the current week, `1` the previous one; negative values
/// look ahead. `None` when the shifted week falls outside the calendar
/// range chrono can represent.
pub fn week_window(today: NaiveDate, offset: i64) -> Option<DateWindow> {
    let days_since_sunday = i64::from(today.weekday().num_days_from_sunday());
    let back = offset.checked_mul(7)?.checked_add(days_since_sunday)?;
    let start = today.checked_sub_signed(Duration::try_days(back)?)?;
    let end = start.checked_add_signed(Duration::try_days(6)?)?;
    Some(DateWindow { start, end })
}

/// Lenient date parsing for query parameters and imported documents:
/// `YYYY-MM-DD` or an RFC 3339 timestamp. Anything else is `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Equality filters plus an optional date window. Every condition that is
/// set must hold.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<String>,
    pub project: Option<String>,
    pub employee_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub window: Option<DateWindow>,
    pub overdue_only: bool,
}

impl TaskFilter {
    pub fn matches(&self, task: &TaskRow, now: DateTime<Utc>) -> bool {
        if let Some(status) = &self.status {
            if &task.status != status {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if task.project.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some(employee_id) = self.employee_id {
            if task.user_id != employee_id {
                return false;
            }
        }
        if let Some(department_id) = self.department_id {
            if task.department_id != Some(department_id) {
                return false;
            }
        }
        if let Some(window) = &self.window {
            // Undated tasks fall outside every window.
            match task.start_date.or(task.end_date) {
                Some(date) if window.contains(date) => {}
                _ => return false,
            }
        }
        if self.overdue_only && !task.is_overdue(now) {
            return false;
        }
        true
    }

    pub fn apply(&self, tasks: Vec<TaskRow>, now: DateTime<Utc>) -> Vec<TaskRow> {
        tasks.into_iter().filter(|task| self.matches(task, now)).collect()
    }
}
