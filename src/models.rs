use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttendanceError;

pub const MIN_LECTURE_NUMBER: i32 = 1;
pub const MAX_LECTURE_NUMBER: i32 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub roll_number: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub full_name: String,
    pub roll_number: String,
    pub email: String,
    pub credential_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = AttendanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(AttendanceError::Validation(format!(
                "unknown priority '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub professor_name: String,
    pub subject: String,
    pub message: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone)]
pub struct Professor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: String,
}

/// Identity of the professor issuing a request. Built per request from the
/// stored professor row and passed explicitly to whatever needs it.
#[derive(Debug, Clone)]
pub struct ProfessorContext {
    pub professor_id: Uuid,
    pub name: String,
    pub subject: String,
}

impl From<&Professor> for ProfessorContext {
    fn from(professor: &Professor) -> Self {
        Self {
            professor_id: professor.id,
            name: professor.name.clone(),
            subject: professor.subject.clone(),
        }
    }
}

/// One attendance fact. `student_identifier` is kept exactly as reported;
/// it is resolved against the roster only when statistics are read.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_identifier: String,
    pub subject: String,
    pub lecture_number: i32,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Full English weekday name, the form timetable rows are keyed by.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[derive(Debug, Clone)]
pub struct TimetableEntry {
    pub weekday: Weekday,
    pub subjects: Vec<String>,
}

impl TimetableEntry {
    pub fn subject_for(&self, lecture_number: i32) -> Option<&str> {
        if lecture_number < MIN_LECTURE_NUMBER {
            return None;
        }
        self.subjects
            .get((lecture_number - 1) as usize)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub created: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatSummary {
    pub total_lectures: usize,
    pub attended_lectures: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendedLecture {
    pub lecture_number: i32,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStudentStat {
    pub student_id: Uuid,
    pub student_name: String,
    pub roll_number: String,
    pub attended_lectures: Vec<AttendedLecture>,
    pub summary: StatSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
    High,
    MediumHigh,
    MediumLow,
    Low,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::High,
        Bucket::MediumHigh,
        Bucket::MediumLow,
        Bucket::Low,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Bucket::High => "High (90% and above)",
            Bucket::MediumHigh => "Medium-high (75-89%)",
            Bucket::MediumLow => "Medium-low (51-74%)",
            Bucket::Low => "Low (below 51%)",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub subjects_scheduled: Vec<String>,
    pub students: Vec<DailyStudentStat>,
    pub unmatched_identifiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSubjectCounts {
    pub student_id: Uuid,
    pub student_name: String,
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallStats {
    pub subject_counts: BTreeMap<String, usize>,
    pub student_subject_counts: Vec<StudentSubjectCounts>,
    pub total_lectures_per_subject: BTreeMap<String, usize>,
    pub unmatched_identifiers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LectureStatus {
    Recorded,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct LectureProgress {
    pub lecture_number: i32,
    pub subject: String,
    pub status: LectureStatus,
}

/// A lecture session as the professor dashboard sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LectureSession {
    pub date: NaiveDate,
    pub lecture_number: i32,
}

impl fmt::Display for LectureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date, self.lecture_number)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardRow {
    pub student_id: Uuid,
    pub student_name: String,
    pub present: Vec<bool>,
    pub summary: StatSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectDashboard {
    pub subject: String,
    pub since: NaiveDate,
    pub sessions: Vec<LectureSession>,
    pub rows: Vec<DashboardRow>,
}
