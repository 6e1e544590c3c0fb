use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use uuid::Uuid;

use crate::error::{AttendanceError, Result};
use crate::models::{
    Alert, AttendanceRecord, NewStudent, Professor, ProfessorContext, RecordOutcome, Student,
    TimetableEntry,
};

pub const RECENT_RECORDS_LIMIT: usize = 500;

/// One recognizer (or manual) batch for a single lecture slot.
#[derive(Debug, Clone)]
pub struct AttendanceBatch {
    pub subject: String,
    pub lecture_number: i32,
    pub date: NaiveDate,
    pub identities: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub date: Option<NaiveDate>,
    pub lecture_number: Option<i32>,
}

/// Storage used by the recorder, the aggregator and the alert flow.
///
/// Students come back in enrollment order, which is the roster order the
/// identity matcher relies on for tie-breaks. `insert_attendance_batch` must
/// be atomic: either every new fact of the batch is stored or none is, and
/// facts already present for the same (date, lecture, subject, identity)
/// count as skipped.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn create_student(&self, student: NewStudent) -> Result<Student>;
    async fn list_students(&self) -> Result<Vec<Student>>;
    /// Includes the student's alerts, oldest first.
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>>;
    async fn delete_student(&self, id: Uuid) -> Result<bool>;

    async fn find_professor(&self, id: Uuid) -> Result<Option<Professor>>;

    async fn timetable_for(&self, weekday: Weekday) -> Result<Option<TimetableEntry>>;
    async fn upsert_timetable(&self, entry: &TimetableEntry) -> Result<()>;

    async fn insert_attendance_batch(&self, batch: &AttendanceBatch) -> Result<RecordOutcome>;
    async fn attendance_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>>;
    async fn all_attendance(&self) -> Result<Vec<AttendanceRecord>>;
    async fn attendance_for_subject_since(
        &self,
        subject: &str,
        since: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>>;
    /// Newest first, capped at [`RECENT_RECORDS_LIMIT`].
    async fn recent_attendance(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>>;

    async fn append_alert(&self, student_id: Uuid, alert: &Alert) -> Result<()>;
    async fn mark_alert_read(&self, student_id: Uuid, alert_id: Uuid) -> Result<bool>;
}

/// Looks up the professor issuing a request and turns it into the context
/// that request-scoped operations take.
pub async fn professor_context<S>(store: &S, professor_id: Uuid) -> Result<ProfessorContext>
where
    S: AttendanceStore + ?Sized,
{
    store
        .find_professor(professor_id)
        .await?
        .map(|professor| ProfessorContext::from(&professor))
        .ok_or_else(|| AttendanceError::NotFound(format!("professor {professor_id}")))
}

#[cfg(test)]
pub use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use async_trait::async_trait;
    use chrono::{NaiveDate, Weekday};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::{AttendanceBatch, AttendanceStore, RecordFilter, RECENT_RECORDS_LIMIT};
    use crate::error::{AttendanceError, Result};
    use crate::models::{
        Alert, AttendanceRecord, NewStudent, Professor, RecordOutcome, Student, TimetableEntry,
    };

    #[derive(Default)]
    struct MemoryState {
        students: Vec<Student>,
        professors: Vec<Professor>,
        timetable: Vec<TimetableEntry>,
        attendance: Vec<AttendanceRecord>,
    }

    /// In-process store. Every operation holds one lock, so the duplicate check
    /// and the insert of a batch cannot interleave with another batch.
    #[derive(Default)]
    pub struct MemoryStore {
        state: Mutex<MemoryState>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_professor(&self, name: &str, email: &str, subject: &str) -> Professor {
            let professor = Professor {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: email.to_string(),
                subject: subject.to_string(),
            };
            self.state.lock().await.professors.push(professor.clone());
            professor
        }

        pub async fn attendance_count(&self) -> usize {
            self.state.lock().await.attendance.len()
        }
    }

    fn same_fact(record: &AttendanceRecord, batch: &AttendanceBatch, identity: &str) -> bool {
        record.date == batch.date
            && record.lecture_number == batch.lecture_number
            && record.subject == batch.subject
            && record.student_identifier == identity
    }

    #[async_trait]
    impl AttendanceStore for MemoryStore {
        async fn create_student(&self, student: NewStudent) -> Result<Student> {
            let mut state = self.state.lock().await;
            if state
                .students
                .iter()
                .any(|s| s.full_name == student.full_name)
            {
                return Err(AttendanceError::Validation(format!(
                    "a student named '{}' is already enrolled",
                    student.full_name
                )));
            }

            let created = Student {
                id: Uuid::new_v4(),
                full_name: student.full_name,
                roll_number: student.roll_number,
                email: student.email,
                credential_hash: student.credential_hash,
                alerts: Vec::new(),
            };
            state.students.push(created.clone());
            Ok(created)
        }

        async fn list_students(&self) -> Result<Vec<Student>> {
            Ok(self.state.lock().await.students.clone())
        }

        async fn find_student(&self, id: Uuid) -> Result<Option<Student>> {
            let state = self.state.lock().await;
            Ok(state.students.iter().find(|s| s.id == id).cloned())
        }

        async fn delete_student(&self, id: Uuid) -> Result<bool> {
            let mut state = self.state.lock().await;
            let before = state.students.len();
            state.students.retain(|s| s.id != id);
            Ok(state.students.len() != before)
        }

        async fn find_professor(&self, id: Uuid) -> Result<Option<Professor>> {
            let state = self.state.lock().await;
            Ok(state.professors.iter().find(|p| p.id == id).cloned())
        }

        async fn timetable_for(&self, weekday: Weekday) -> Result<Option<TimetableEntry>> {
            let state = self.state.lock().await;
            Ok(state
                .timetable
                .iter()
                .find(|entry| entry.weekday == weekday)
                .cloned())
        }

        async fn upsert_timetable(&self, entry: &TimetableEntry) -> Result<()> {
            let mut state = self.state.lock().await;
            state.timetable.retain(|existing| existing.weekday != entry.weekday);
            state.timetable.push(entry.clone());
            Ok(())
        }

        async fn insert_attendance_batch(&self, batch: &AttendanceBatch) -> Result<RecordOutcome> {
            let mut state = self.state.lock().await;
            let mut outcome = RecordOutcome::default();

            for identity in &batch.identities {
                if state
                    .attendance
                    .iter()
                    .any(|record| same_fact(record, batch, identity))
                {
                    outcome.skipped += 1;
                    continue;
                }

                state.attendance.push(AttendanceRecord {
                    id: Uuid::new_v4(),
                    student_identifier: identity.clone(),
                    subject: batch.subject.clone(),
                    lecture_number: batch.lecture_number,
                    date: batch.date,
                    created_at: batch.recorded_at,
                });
                outcome.created += 1;
            }

            Ok(outcome)
        }

        async fn attendance_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
            let state = self.state.lock().await;
            Ok(state
                .attendance
                .iter()
                .filter(|record| record.date == date)
                .cloned()
                .collect())
        }

        async fn all_attendance(&self) -> Result<Vec<AttendanceRecord>> {
            Ok(self.state.lock().await.attendance.clone())
        }

        async fn attendance_for_subject_since(
            &self,
            subject: &str,
            since: NaiveDate,
        ) -> Result<Vec<AttendanceRecord>> {
            let state = self.state.lock().await;
            let mut records: Vec<AttendanceRecord> = state
                .attendance
                .iter()
                .filter(|record| record.subject == subject && record.date >= since)
                .cloned()
                .collect();
            records.sort_by_key(|record| (record.date, record.lecture_number));
            Ok(records)
        }

        async fn recent_attendance(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
            let state = self.state.lock().await;
            let mut records: Vec<AttendanceRecord> = state
                .attendance
                .iter()
                .filter(|record| filter.date.map_or(true, |date| record.date == date))
                .filter(|record| {
                    filter
                        .lecture_number
                        .map_or(true, |lecture| record.lecture_number == lecture)
                })
                .cloned()
                .collect();
            records.reverse();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            records.truncate(RECENT_RECORDS_LIMIT);
            Ok(records)
        }

        async fn append_alert(&self, student_id: Uuid, alert: &Alert) -> Result<()> {
            let mut state = self.state.lock().await;
            let student = state
                .students
                .iter_mut()
                .find(|s| s.id == student_id)
                .ok_or_else(|| AttendanceError::NotFound(format!("student {student_id}")))?;
            student.alerts.push(alert.clone());
            Ok(())
        }

        async fn mark_alert_read(&self, student_id: Uuid, alert_id: Uuid) -> Result<bool> {
            let mut state = self.state.lock().await;
            let student = state
                .students
                .iter_mut()
                .find(|s| s.id == student_id)
                .ok_or_else(|| AttendanceError::NotFound(format!("student {student_id}")))?;

            match student.alerts.iter_mut().find(|a| a.id == alert_id) {
                Some(alert) => {
                    alert.read = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn batch(identities: &[&str], lecture_number: i32) -> AttendanceBatch {
        AttendanceBatch {
            subject: "Math".to_string(),
            lecture_number,
            date: NaiveDate::from_ymd_opt(2025, 9, 20).unwrap(),
            identities: identities.iter().map(|s| s.to_string()).collect(),
            recorded_at: Utc.with_ymd_and_hms(2025, 9, 20, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn duplicate_facts_are_skipped() {
        let store = MemoryStore::new();
        let first = store
            .insert_attendance_batch(&batch(&["Alice Roy", "Bob Sen"], 1))
            .await
            .unwrap();
        assert_eq!(first, RecordOutcome { created: 2, skipped: 0 });

        let second = store
            .insert_attendance_batch(&batch(&["Alice Roy", "Alice Roy"], 1))
            .await
            .unwrap();
        assert_eq!(second, RecordOutcome { created: 0, skipped: 2 });
        assert_eq!(store.attendance_count().await, 2);
    }

    #[tokio::test]
    async fn dedup_key_is_case_sensitive_and_per_lecture() {
        let store = MemoryStore::new();
        store
            .insert_attendance_batch(&batch(&["Alice Roy"], 1))
            .await
            .unwrap();
        let outcome = store
            .insert_attendance_batch(&batch(&["alice roy"], 1))
            .await
            .unwrap();
        assert_eq!(outcome.created, 1);

        let other_lecture = store
            .insert_attendance_batch(&batch(&["Alice Roy"], 2))
            .await
            .unwrap();
        assert_eq!(other_lecture.created, 1);
        assert_eq!(store.attendance_count().await, 3);
    }

    #[tokio::test]
    async fn student_names_are_unique() {
        let store = MemoryStore::new();
        let new = NewStudent {
            full_name: "Alice Roy".to_string(),
            roll_number: "R1".to_string(),
            email: "alice@example.edu".to_string(),
            credential_hash: "hash".to_string(),
        };
        store.create_student(new.clone()).await.unwrap();
        let err = store.create_student(new).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));
    }

    #[tokio::test]
    async fn removed_students_leave_the_roster() {
        let store = MemoryStore::new();
        let student = store
            .create_student(NewStudent {
                full_name: "Alice Roy".to_string(),
                roll_number: "R1".to_string(),
                email: "alice@example.edu".to_string(),
                credential_hash: "hash".to_string(),
            })
            .await
            .unwrap();

        assert!(store.delete_student(student.id).await.unwrap());
        assert!(store.list_students().await.unwrap().is_empty());
        assert!(store.find_student(student.id).await.unwrap().is_none());
        assert!(!store.delete_student(student.id).await.unwrap());
    }

    #[tokio::test]
    async fn recent_attendance_honours_filters() {
        let store = MemoryStore::new();
        store
            .insert_attendance_batch(&batch(&["Alice Roy"], 1))
            .await
            .unwrap();
        store
            .insert_attendance_batch(&batch(&["Alice Roy"], 2))
            .await
            .unwrap();

        let filtered = store
            .recent_attendance(&RecordFilter {
                date: None,
                lecture_number: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].lecture_number, 2);
    }

    #[tokio::test]
    async fn professor_context_comes_from_stored_professor() {
        let store = MemoryStore::new();
        let professor = store.add_professor("Dr. Rao", "rao@example.edu", "Math").await;

        let context = professor_context(&store, professor.id).await.unwrap();
        assert_eq!(context.professor_id, professor.id);
        assert_eq!(context.subject, "Math");

        let err = professor_context(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));
    }

    #[tokio::test]
    async fn alerts_on_missing_student_are_not_found() {
        let store = MemoryStore::new();
        let alert = Alert {
            id: Uuid::new_v4(),
            professor_name: "Dr. Rao".to_string(),
            subject: "Math".to_string(),
            message: "See me".to_string(),
            priority: Default::default(),
            created_at: Utc::now(),
            read: false,
        };
        let err = store.append_alert(Uuid::new_v4(), &alert).await.unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));
    }
}
