use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::task::{TaskRow, TaskStatus};

pub const UNASSIGNED_DEPARTMENT: &str = "Unassigned";
pub const NO_PROJECT: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Employee,
    Department,
    Project,
}

/// Per-group rollup shown on the dashboards.
///
/// `total` counts every task in the group. Tasks whose stored status is not
/// one of the four known values land in `unrecognized` only, so
/// `completed + in_progress + pending + blocked + unrecognized == total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub key: String,
    pub label: String,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub blocked: usize,
    pub unrecognized: usize,
    pub overdue: usize,
    pub completion_percentage: u8,
}

impl GroupStats {
    fn new(key: String, label: String) -> Self {
        GroupStats {
            key,
            label,
            total: 0,
            completed: 0,
            in_progress: 0,
            pending: 0,
            blocked: 0,
            unrecognized: 0,
            overdue: 0,
            completion_percentage: 0,
        }
    }

    fn record(&mut self, task: &TaskRow, now: DateTime<Utc>) {
        self.total += 1;
        match task.status.parse::<TaskStatus>() {
            Ok(TaskStatus::Completed) => self.completed += 1,
            Ok(TaskStatus::InProgress) => self.in_progress += 1,
            Ok(TaskStatus::Pending) => self.pending += 1,
            Ok(TaskStatus::Blocked) => self.blocked += 1,
            Err(_) => self.unrecognized += 1,
        }
        if task.is_overdue(now) {
            self.overdue += 1;
        }
    }

    fn finish(mut self) -> Self {
        self.completion_percentage = completion_percentage(self.completed, self.total);
        self
    }
}

/// `round(completed / total * 100)`, and 0 for an empty group.
pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = completed.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}

fn group_key(task: &TaskRow, group_by: GroupBy) -> (String, String) {
    match group_by {
        GroupBy::Employee => (task.user_id.to_string(), task.employee_name.clone()),
        GroupBy::Department => match (task.department_id, &task.department_name) {
            (Some(id), Some(name)) => (id.to_string(), name.clone()),
            _ => (
                UNASSIGNED_DEPARTMENT.to_lowercase(),
                UNASSIGNED_DEPARTMENT.to_string(),
            ),
        },
        GroupBy::Project => {
            let name = task
                .project
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or(NO_PROJECT);
            (name.to_string(), name.to_string())
        }
    }
}

/// Groups tasks by employee, department or project and counts them per
/// status. Groups come back ordered by label, then key.
pub fn aggregate(tasks: &[TaskRow], group_by: GroupBy, now: DateTime<Utc>) -> Vec<GroupStats> {
    let mut groups: HashMap<String, GroupStats> = HashMap::new();
    for task in tasks {
        let (key, label) = group_key(task, group_by);
        groups
            .entry(key.clone())
            .or_insert_with(|| GroupStats::new(key, label))
            .record(task, now);
    }

    let mut stats: Vec<GroupStats> = groups.into_values().map(GroupStats::finish).collect();
    stats.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)));
    stats
}

/// Single rollup over every task, for the dashboard header.
pub fn summarize(tasks: &[TaskRow], now: DateTime<Utc>) -> GroupStats {
    let mut overall = GroupStats::new("all".to_string(), "All tasks".to_string());
    for task in tasks {
        overall.record(task, now);
    }
    overall.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap()
    }

    fn task(user: Uuid, name: &str, status: &str) -> TaskRow {
        TaskRow {
            task_id: Uuid::new_v4(),
            user_id: user,
            employee_name: name.to_string(),
            department_id: None,
            department_name: None,
            task_name: "Task".to_string(),
            project: None,
            assigned_by: None,
            start_date: None,
            end_date: None,
            remark: None,
            status: status.to_string(),
        }
    }

    #[test]
    fn mixed_statuses_aggregate_as_expected() {
        let user = Uuid::new_v4();
        let tasks = vec![
            task(user, "Ada", "completed"),
            task(user, "Ada", "pending"),
            task(user, "Ada", "blocked"),
        ];
        let stats = aggregate(&tasks, GroupBy::Employee, now());
        assert_eq!(stats.len(), 1);
        let ada = &stats[0];
        assert_eq!(ada.total, 3);
        assert_eq!(ada.completed, 1);
        assert_eq!(ada.pending, 1);
        assert_eq!(ada.blocked, 1);
        assert_eq!(ada.in_progress, 0);
        assert_eq!(ada.completion_percentage, 33);
    }

    #[test]
    fn buckets_sum_to_recognized_tasks() {
        let user = Uuid::new_v4();
        let statuses = ["completed", "pending", "in-progress", "blocked", "archived", "completed", ""];
        let tasks: Vec<_> = statuses.iter().map(|s| task(user, "Ada", s)).collect();
        let overall = summarize(&tasks, now());

        let bucketed = overall.completed + overall.in_progress + overall.pending + overall.blocked;
        assert_eq!(bucketed, 5);
        assert_eq!(overall.unrecognized, 2);
        assert_eq!(overall.total, 7);
        assert_eq!(overall.completion_percentage, 29);
    }

    #[test]
    fn empty_input_has_zero_percentage() {
        let overall = summarize(&[], now());
        assert_eq!(overall.total, 0);
        assert_eq!(overall.completion_percentage, 0);
        assert!(aggregate(&[], GroupBy::Project, now()).is_empty());
    }

    #[test]
    fn percentage_stays_within_bounds() {
        for total in 0..20 {
            for completed in 0..=total {
                assert!(completion_percentage(completed, total) <= 100);
            }
        }
        assert_eq!(completion_percentage(2, 2), 100);
        assert_eq!(completion_percentage(1, 8), 13);
    }

    #[test]
    fn missing_department_groups_as_unassigned() {
        let engineering = Uuid::new_v4();
        let mut staffed = task(Uuid::new_v4(), "Ada", "completed");
        staffed.department_id = Some(engineering);
        staffed.department_name = Some("Engineering".to_string());
        let orphan = task(Uuid::new_v4(), "Bob", "pending");

        let stats = aggregate(&[staffed, orphan], GroupBy::Department, now());
        let labels: Vec<_> = stats.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Engineering", "Unassigned"]);
        assert_eq!(stats[0].key, engineering.to_string());
        assert_eq!(stats[0].completion_percentage, 100);
    }

    #[test]
    fn blank_project_groups_as_not_applicable() {
        let mut apollo = task(Uuid::new_v4(), "Ada", "pending");
        apollo.project = Some("Apollo".to_string());
        let mut blank = task(Uuid::new_v4(), "Bob", "pending");
        blank.project = Some("  ".to_string());
        let none = task(Uuid::new_v4(), "Cy", "completed");

        let stats = aggregate(&[apollo, blank, none], GroupBy::Project, now());
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].label, "Apollo");
        assert_eq!(stats[1].label, NO_PROJECT);
        assert_eq!(stats[1].total, 2);
        assert_eq!(stats[1].completion_percentage, 50);
    }

    #[test]
    fn employees_with_same_name_stay_separate() {
        let tasks = vec![
            task(Uuid::new_v4(), "Sam", "pending"),
            task(Uuid::new_v4(), "Sam", "completed"),
        ];
        assert_eq!(aggregate(&tasks, GroupBy::Employee, now()).len(), 2);
    }

    #[test]
    fn overdue_is_counted_per_group() {
        let user = Uuid::new_v4();
        let mut late = task(user, "Ada", "pending");
        late.end_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let mut late_but_done = task(user, "Ada", "completed");
        late_but_done.end_date = NaiveDate::from_ymd_opt(2024, 1, 1);

        let stats = aggregate(&[late, late_but_done], GroupBy::Employee, now());
        assert_eq!(stats[0].overdue, 1);
    }

    #[test]
    fn group_by_parses_lowercase_names() {
        let parsed: GroupBy = serde_json::from_str("\"department\"").unwrap();
        assert_eq!(parsed, GroupBy::Department);
        assert_eq!(GroupBy::default(), GroupBy::Employee);
    }
}
