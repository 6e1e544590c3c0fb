use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc, Weekday};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AttendanceError, Result};
use crate::models::{
    weekday_name, Alert, AttendanceRecord, NewStudent, Professor, RecordOutcome, Student,
    TimetableEntry,
};
use crate::store::{AttendanceBatch, AttendanceStore, RecordFilter, RECENT_RECORDS_LIMIT};

/// Stored for seeded students until a real credential is imported.
pub const UNSET_CREDENTIAL: &str = "unset";

const ATTENDANCE_COLUMNS: &str =
    "id, student_identifier, subject, lecture_number, date, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Schema migrations applied");
        Ok(())
    }

    pub async fn create_professor(
        &self,
        name: &str,
        email: &str,
        subject: &str,
    ) -> Result<Professor> {
        let row = sqlx::query(
            r#"
            INSERT INTO lecture_attendance.professors (id, name, email, subject)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, subject = EXCLUDED.subject
            RETURNING id, name, email, subject
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(subject)
        .fetch_one(&self.pool)
        .await?;

        Ok(professor_from_row(&row))
    }

    pub async fn seed(&self) -> anyhow::Result<()> {
        let students = vec![
            ("Alice Roy", "R1", "alice.roy@college.edu"),
            ("Bikram Sen", "R2", "bikram.sen@college.edu"),
            ("Chitra Das", "R3", "chitra.das@college.edu"),
        ];

        for (name, roll, email) in students {
            sqlx::query(
                r#"
                INSERT INTO lecture_attendance.students
                (id, full_name, roll_number, email, credential_hash)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (full_name) DO UPDATE
                SET roll_number = EXCLUDED.roll_number, email = EXCLUDED.email
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(roll)
            .bind(email)
            .bind(UNSET_CREDENTIAL)
            .execute(&self.pool)
            .await?;
        }

        self.create_professor("Dr. Meera Rao", "meera.rao@college.edu", "Mathematics")
            .await?;
        self.create_professor("Dr. Arun Pal", "arun.pal@college.edu", "Physics")
            .await?;

        let week = vec![
            (Weekday::Mon, vec!["Mathematics", "Physics", "Chemistry"]),
            (Weekday::Tue, vec!["Physics", "Mathematics"]),
            (Weekday::Wed, vec!["Chemistry", "Mathematics", "Physics"]),
            (Weekday::Thu, vec!["Mathematics", "Chemistry"]),
            (Weekday::Fri, vec!["Physics", "Chemistry", "Mathematics"]),
        ];
        for (weekday, subjects) in week {
            self.upsert_timetable(&TimetableEntry {
                weekday,
                subjects: subjects.into_iter().map(str::to_string).collect(),
            })
            .await?;
        }

        let seeded = NaiveDate::from_ymd_opt(2025, 9, 22).context("invalid date")?;
        let batches = vec![
            ("Mathematics", 1, vec!["Alice Roy", "Bikram Sen", "chitra"]),
            ("Physics", 2, vec!["Alice Roy", "R3"]),
        ];
        for (subject, lecture_number, identities) in batches {
            self.insert_attendance_batch(&AttendanceBatch {
                subject: subject.to_string(),
                lecture_number,
                date: seeded,
                identities: identities.into_iter().map(str::to_string).collect(),
                recorded_at: Utc::now(),
            })
            .await?;
        }

        Ok(())
    }

    /// Imports students from a CSV with columns
    /// `full_name,roll_number,email,credential_hash`. Existing names are left
    /// untouched; returns the number of students added.
    pub async fn import_roster(&self, csv_path: &std::path::Path) -> anyhow::Result<usize> {
        #[derive(serde::Deserialize)]
        struct CsvRow {
            full_name: String,
            roll_number: String,
            email: String,
            credential_hash: String,
        }

        let mut reader = csv::Reader::from_path(csv_path)?;
        let mut inserted = 0usize;

        for result in reader.deserialize::<CsvRow>() {
            let row = result?;
            if row.full_name.trim().is_empty() || row.credential_hash.is_empty() {
                warn!("Skipping roster row with missing name or credential");
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO lecture_attendance.students
                (id, full_name, roll_number, email, credential_hash)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (full_name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(row.full_name.trim())
            .bind(row.roll_number.trim())
            .bind(row.email.trim())
            .bind(&row.credential_hash)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        full_name: row.get("full_name"),
        roll_number: row.get("roll_number"),
        email: row.get("email"),
        credential_hash: row.get("credential_hash"),
        alerts: Vec::new(),
    }
}

fn professor_from_row(row: &PgRow) -> Professor {
    Professor {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        subject: row.get("subject"),
    }
}

fn attendance_from_row(row: &PgRow) -> AttendanceRecord {
    AttendanceRecord {
        id: row.get("id"),
        student_identifier: row.get("student_identifier"),
        subject: row.get("subject"),
        lecture_number: row.get("lecture_number"),
        date: row.get("date"),
        created_at: row.get("created_at"),
    }
}

fn alert_from_row(row: &PgRow) -> Result<Alert> {
    let priority: String = row.get("priority");
    Ok(Alert {
        id: row.get("id"),
        professor_name: row.get("professor_name"),
        subject: row.get("subject"),
        message: row.get("message"),
        priority: priority.parse()?,
        created_at: row.get("created_at"),
        read: row.get("read"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn create_student(&self, student: NewStudent) -> Result<Student> {
        let row = sqlx::query(
            r#"
            INSERT INTO lecture_attendance.students
            (id, full_name, roll_number, email, credential_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, full_name, roll_number, email, credential_hash
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&student.full_name)
        .bind(&student.roll_number)
        .bind(&student.email)
        .bind(&student.credential_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AttendanceError::Validation(format!(
                    "a student named '{}' is already enrolled",
                    student.full_name
                ))
            } else {
                err.into()
            }
        })?;

        Ok(student_from_row(&row))
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query(
            "SELECT id, full_name, roll_number, email, credential_hash \
             FROM lecture_attendance.students ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(student_from_row).collect())
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>> {
        let row = sqlx::query(
            "SELECT id, full_name, roll_number, email, credential_hash \
             FROM lecture_attendance.students WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut student = student_from_row(&row);

        let alert_rows = sqlx::query(
            "SELECT id, professor_name, subject, message, priority, created_at, read \
             FROM lecture_attendance.alerts WHERE student_id = $1 ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        student.alerts = alert_rows
            .iter()
            .map(alert_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(student))
    }

    async fn delete_student(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM lecture_attendance.students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_professor(&self, id: Uuid) -> Result<Option<Professor>> {
        let row = sqlx::query(
            "SELECT id, name, email, subject FROM lecture_attendance.professors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(professor_from_row))
    }

    async fn timetable_for(&self, weekday: Weekday) -> Result<Option<TimetableEntry>> {
        let row = sqlx::query("SELECT subjects FROM lecture_attendance.timetable WHERE weekday = $1")
            .bind(weekday_name(weekday))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| TimetableEntry {
            weekday,
            subjects: row.get("subjects"),
        }))
    }

    async fn upsert_timetable(&self, entry: &TimetableEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lecture_attendance.timetable (weekday, subjects)
            VALUES ($1, $2)
            ON CONFLICT (weekday) DO UPDATE SET subjects = EXCLUDED.subjects
            "#,
        )
        .bind(weekday_name(entry.weekday))
        .bind(&entry.subjects)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_attendance_batch(&self, batch: &AttendanceBatch) -> Result<RecordOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = RecordOutcome::default();

        for identity in &batch.identities {
            let result = sqlx::query(
                r#"
                INSERT INTO lecture_attendance.attendance
                (id, student_identifier, subject, lecture_number, date, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (date, lecture_number, subject, student_identifier) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(identity)
            .bind(&batch.subject)
            .bind(batch.lecture_number)
            .bind(batch.date)
            .bind(batch.recorded_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                outcome.created += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        tx.commit().await?;
        debug!(
            "Attendance batch committed: {} created, {} skipped",
            outcome.created, outcome.skipped
        );
        Ok(outcome)
    }

    async fn attendance_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM lecture_attendance.attendance \
             WHERE date = $1 ORDER BY lecture_number, created_at, id"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(attendance_from_row).collect())
    }

    async fn all_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM lecture_attendance.attendance \
             ORDER BY date, lecture_number, created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(attendance_from_row).collect())
    }

    async fn attendance_for_subject_since(
        &self,
        subject: &str,
        since: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM lecture_attendance.attendance \
             WHERE subject = $1 AND date >= $2 ORDER BY date, lecture_number"
        ))
        .bind(subject)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(attendance_from_row).collect())
    }

    async fn recent_attendance(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
        let mut query = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM lecture_attendance.attendance WHERE TRUE"
        );
        let mut next_param = 1;
        if filter.date.is_some() {
            query.push_str(&format!(" AND date = ${next_param}"));
            next_param += 1;
        }
        if filter.lecture_number.is_some() {
            query.push_str(&format!(" AND lecture_number = ${next_param}"));
        }
        query.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {RECENT_RECORDS_LIMIT}"
        ));

        let mut rows = sqlx::query(&query);
        if let Some(date) = filter.date {
            rows = rows.bind(date);
        }
        if let Some(lecture_number) = filter.lecture_number {
            rows = rows.bind(lecture_number);
        }

        let records = rows.fetch_all(&self.pool).await?;
        Ok(records.iter().map(attendance_from_row).collect())
    }

    async fn append_alert(&self, student_id: Uuid, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lecture_attendance.alerts
            (id, student_id, professor_name, subject, message, priority, created_at, read)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(alert.id)
        .bind(student_id)
        .bind(&alert.professor_name)
        .bind(&alert.subject)
        .bind(&alert.message)
        .bind(alert.priority.as_str())
        .bind(alert.created_at)
        .bind(alert.read)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            let missing_student = err
                .as_database_error()
                .map(|db| db.is_foreign_key_violation())
                .unwrap_or(false);
            if missing_student {
                AttendanceError::NotFound(format!("student {student_id}"))
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    async fn mark_alert_read(&self, student_id: Uuid, alert_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE lecture_attendance.alerts SET read = TRUE WHERE id = $1 AND student_id = $2",
        )
        .bind(alert_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
