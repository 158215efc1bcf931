use chrono::{DateTime, NaiveDate, Utc};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::models::user::EmployeeWithTasks;

const MISSING: &str = "-";

pub const HEADERS: [&str; 12] = [
    "Employee",
    "Email",
    "Department",
    "Job Title",
    "Task",
    "Project",
    "Assigned By",
    "Start Date",
    "End Date",
    "Status",
    "Remark",
    "Overdue",
];

/// One line of the task export. Fields line up with [`HEADERS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub employee: String,
    pub email: String,
    pub department: String,
    pub job_title: String,
    pub task: String,
    pub project: String,
    pub assigned_by: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub remark: String,
    pub overdue: String,
}

impl ExportRow {
    fn cells(&self) -> [&str; 12] {
        [
            self.employee.as_str(),
            self.email.as_str(),
            self.department.as_str(),
            self.job_title.as_str(),
            self.task.as_str(),
            self.project.as_str(),
            self.assigned_by.as_str(),
            self.start_date.as_str(),
            self.end_date.as_str(),
            self.status.as_str(),
            self.remark.as_str(),
            self.overdue.as_str(),
        ]
    }
}

fn or_missing(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => MISSING.to_string(),
    }
}

fn date_or_missing(value: Option<NaiveDate>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

/// Flattens employees and their tasks into one row per task. Employees
/// without tasks still get a single row with `-` in every task column.
pub fn flatten(employees: &[EmployeeWithTasks], now: DateTime<Utc>) -> Vec<ExportRow> {
    let mut rows = Vec::new();
    for entry in employees {
        let employee = &entry.employee;
        let base = ExportRow {
            employee: employee.name.clone(),
            email: employee.email.clone(),
            department: or_missing(employee.department_name.as_deref()),
            job_title: or_missing(employee.job_title.as_deref()),
            task: MISSING.to_string(),
            project: MISSING.to_string(),
            assigned_by: MISSING.to_string(),
            start_date: MISSING.to_string(),
            end_date: MISSING.to_string(),
            status: MISSING.to_string(),
            remark: MISSING.to_string(),
            overdue: MISSING.to_string(),
        };

        if entry.tasks.is_empty() {
            rows.push(base);
            continue;
        }

        for task in &entry.tasks {
            rows.push(ExportRow {
                task: task.task_name.clone(),
                project: or_missing(task.project.as_deref()),
                assigned_by: or_missing(task.assigned_by.as_deref()),
                start_date: date_or_missing(task.start_date),
                end_date: date_or_missing(task.end_date),
                status: task.status.to_string(),
                remark: or_missing(task.remark.as_deref()),
                overdue: if task.is_overdue(now) { "Yes" } else { "No" }.to_string(),
                ..base.clone()
            });
        }
    }
    rows
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(rows: &[ExportRow]) -> String {
    let mut csv_content = HEADERS.join(",");
    csv_content.push('\n');

    for row in rows {
        let line = row
            .cells()
            .iter()
            .map(|cell| escape_csv(cell))
            .collect::<Vec<_>>()
            .join(",");
        csv_content.push_str(&line);
        csv_content.push('\n');
    }

    csv_content
}

pub fn to_xlsx(rows: &[ExportRow]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Tasks")?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        for (col, cell) in row.cells().iter().enumerate() {
            worksheet.write_string(r, col as u16, *cell)?;
        }
    }

    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{Task, TaskStatus};
    use crate::models::user::{Employee, Role};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap()
    }

    fn employee(name: &str, department: Option<&str>) -> Employee {
        Employee {
            user_id: Uuid::new_v4(),
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            role: Role::Employee,
            job_title: Some("Engineer".to_string()),
            start_date: None,
            avatar_uri: None,
            department_id: None,
            department_name: department.map(str::to_string),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn task(owner: &Employee, name: &str, status: TaskStatus, end: Option<NaiveDate>) -> Task {
        Task {
            task_id: Uuid::new_v4(),
            user_id: owner.user_id,
            task_name: name.to_string(),
            project: Some("Apollo".to_string()),
            assigned_by: Some("Grace".to_string()),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            end_date: end,
            remark: None,
            status,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn one_row_per_task_and_placeholder_for_idle_employee() {
        let ada = employee("Ada", Some("Engineering"));
        let tasks = vec![
            task(&ada, "Design", TaskStatus::Completed, NaiveDate::from_ymd_opt(2024, 6, 2)),
            task(&ada, "Build", TaskStatus::InProgress, NaiveDate::from_ymd_opt(2024, 6, 2)),
        ];
        let idle = employee("Bob", None);
        let input = vec![
            EmployeeWithTasks { employee: ada, tasks },
            EmployeeWithTasks { employee: idle, tasks: vec![] },
        ];

        let rows = flatten(&input, now());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].task, "Design");
        assert_eq!(rows[0].overdue, "No");
        assert_eq!(rows[1].status, "in-progress");
        assert_eq!(rows[1].overdue, "Yes");
        assert_eq!(rows[1].end_date, "2024-06-02");
        assert_eq!(rows[1].remark, "-");

        let placeholder = &rows[2];
        assert_eq!(placeholder.employee, "Bob");
        assert_eq!(placeholder.department, "-");
        assert_eq!(placeholder.task, "-");
        assert_eq!(placeholder.status, "-");
    }

    #[test]
    fn csv_has_fixed_header_and_quotes_special_values() {
        let ada = employee("Ada", Some("R&D, Labs"));
        let mut t = task(&ada, "Say \"hi\"", TaskStatus::Pending, None);
        t.remark = Some("line one\nline two".to_string());
        let rows = flatten(&[EmployeeWithTasks { employee: ada, tasks: vec![t] }], now());

        let csv = to_csv(&rows);
        let header = csv.lines().next().unwrap();
        assert_eq!(
            header,
            "Employee,Email,Department,Job Title,Task,Project,Assigned By,Start Date,End Date,Status,Remark,Overdue"
        );
        assert!(csv.contains("\"R&D, Labs\""));
        assert!(csv.contains("\"Say \"\"hi\"\"\""));
        assert!(csv.contains("\"line one\nline two\""));
        assert!(csv.ends_with('\n'));
    }

    #[test]
    fn csv_of_no_rows_is_just_the_header() {
        assert_eq!(to_csv(&[]).lines().count(), 1);
    }

    #[test]
    fn xlsx_output_is_a_zip_container() {
        let bob = employee("Bob", None);
        let rows = flatten(&[EmployeeWithTasks { employee: bob, tasks: vec![] }], now());
        let bytes = to_xlsx(&rows).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
