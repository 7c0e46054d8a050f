use chrono::NaiveDate;
use serde::Serialize;

use crate::error::AppError;
use crate::models::AttendanceStatus;
use crate::projections::{attendance_summary, section_view};
use crate::store::Snapshot;

const HEADER: [&str; 3] = ["Name", "Roll No.", "Attendance"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub roll_no: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    pub present: usize,
    pub absent: usize,
    pub unmarked: usize,
}

/// One section's attendance for one day, ready for download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceReport {
    pub title: String,
    pub file_name: String,
    pub rows: Vec<ReportRow>,
    pub totals: ReportTotals,
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Makes a section name safe inside a quoted `filename="..."` header
/// parameter: quotes, slashes, control and non-ASCII characters become `_`.
fn file_name_part(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && !matches!(c, '"' | '\\' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl AttendanceReport {
    pub fn build(snapshot: &Snapshot, section_id: i64, date: NaiveDate) -> Result<Self, AppError> {
        let view = section_view(snapshot, section_id)?;
        let entries = attendance_summary(snapshot, section_id, date)?;

        let mut totals = ReportTotals::default();
        let rows = entries
            .into_iter()
            .map(|entry| {
                match entry.status {
                    AttendanceStatus::Present => totals.present += 1,
                    AttendanceStatus::Absent => totals.absent += 1,
                    AttendanceStatus::Unmarked => totals.unmarked += 1,
                }
                ReportRow {
                    name: entry.student.name,
                    roll_no: entry.student.roll_no,
                    status: entry.status,
                }
            })
            .collect();

        Ok(Self {
            title: format!(
                "Attendance Report - {} - {}",
                view.section.name,
                date.format("%B %-d, %Y")
            ),
            file_name: format!(
                "attendance_report_{}_{}.csv",
                file_name_part(&view.section.name),
                date.format("%Y-%m-%d")
            ),
            rows,
            totals,
        })
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&HEADER.join(","));
        out.push('\n');

        for row in &self.rows {
            out.push_str(&format!(
                "{},{},{}\n",
                csv_quote(&row.name),
                csv_quote(&row.roll_no),
                row.status.label()
            ));
        }

        out
    }
}
