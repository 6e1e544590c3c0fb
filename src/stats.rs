use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration, NaiveDate, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::matcher;
use crate::models::{
    AttendanceRecord, AttendedLecture, Bucket, DailyStats, DailyStudentStat, DashboardRow,
    LectureProgress, LectureSession, LectureStatus, OverallStats, ProfessorContext, StatSummary,
    Student, StudentSubjectCounts, SubjectDashboard,
};
use crate::store::AttendanceStore;

pub fn percentage(attended: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((attended as f64 / total as f64) * 100.0).round() as u32
}

pub fn bucket_for(percentage: u32) -> Bucket {
    if percentage >= 90 {
        Bucket::High
    } else if percentage >= 75 {
        Bucket::MediumHigh
    } else if percentage >= 51 {
        Bucket::MediumLow
    } else {
        Bucket::Low
    }
}

pub fn cutoff_date(since_days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(since_days.max(1))
}

/// Maps each distinct identifier to the student it resolves to, if any.
/// Unmatched identifiers are returned sorted.
fn resolve_records<'a>(
    records: &'a [AttendanceRecord],
    roster: &[Student],
) -> (HashMap<&'a str, Uuid>, Vec<String>) {
    let mut resolved = HashMap::new();
    let mut unmatched = BTreeSet::new();

    for record in records {
        let identifier = record.student_identifier.as_str();
        if resolved.contains_key(identifier) || unmatched.contains(identifier) {
            continue;
        }
        match matcher::match_identity(identifier, roster) {
            Some(found) => {
                resolved.insert(identifier, found.student.id);
            }
            None => {
                unmatched.insert(identifier);
            }
        }
    }

    (
        resolved,
        unmatched.into_iter().map(str::to_string).collect(),
    )
}

/// Per-student attendance for one day against that day's schedule.
pub fn daily_stats(
    date: NaiveDate,
    subjects_scheduled: &[String],
    records: &[AttendanceRecord],
    roster: &[Student],
) -> DailyStats {
    let day_records: Vec<AttendanceRecord> = records
        .iter()
        .filter(|record| record.date == date)
        .cloned()
        .collect();
    let (resolved, unmatched) = resolve_records(&day_records, roster);
    let total = subjects_scheduled.len();

    let mut attended: HashMap<Uuid, Vec<AttendedLecture>> = HashMap::new();
    for record in &day_records {
        if let Some(student_id) = resolved.get(record.student_identifier.as_str()) {
            attended.entry(*student_id).or_default().push(AttendedLecture {
                lecture_number: record.lecture_number,
                subject: record.subject.clone(),
            });
        }
    }

    let students = roster
        .iter()
        .map(|student| {
            let mut lectures = attended.remove(&student.id).unwrap_or_default();
            lectures.sort_by(|a, b| {
                a.lecture_number
                    .cmp(&b.lecture_number)
                    .then_with(|| a.subject.cmp(&b.subject))
            });
            let count = lectures.len();
            DailyStudentStat {
                student_id: student.id,
                student_name: student.full_name.clone(),
                roll_number: student.roll_number.clone(),
                attended_lectures: lectures,
                summary: StatSummary {
                    total_lectures: total,
                    attended_lectures: count,
                    percentage: percentage(count, total),
                },
            }
        })
        .collect();

    DailyStats {
        date,
        subjects_scheduled: subjects_scheduled.to_vec(),
        students,
        unmatched_identifiers: unmatched,
    }
}

/// Groups students by bucket, every bucket present even when empty.
pub fn group_by_bucket(students: &[DailyStudentStat]) -> BTreeMap<Bucket, Vec<&DailyStudentStat>> {
    let mut groups: BTreeMap<Bucket, Vec<&DailyStudentStat>> =
        Bucket::ALL.iter().map(|bucket| (*bucket, Vec::new())).collect();

    for stat in students {
        groups
            .entry(bucket_for(stat.summary.percentage))
            .or_default()
            .push(stat);
    }

    groups
}

/// All-time counts per subject and per student. Records without a subject
/// are ignored.
pub fn overall_stats(records: &[AttendanceRecord], roster: &[Student]) -> OverallStats {
    let records: Vec<AttendanceRecord> = records
        .iter()
        .filter(|record| !record.subject.is_empty())
        .cloned()
        .collect();
    let (resolved, unmatched) = resolve_records(&records, roster);

    let mut subject_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut sessions: BTreeMap<String, BTreeSet<LectureSession>> = BTreeMap::new();
    let mut per_student: HashMap<Uuid, BTreeMap<String, usize>> = HashMap::new();

    for record in &records {
        *subject_counts.entry(record.subject.clone()).or_insert(0) += 1;
        sessions
            .entry(record.subject.clone())
            .or_default()
            .insert(LectureSession {
                date: record.date,
                lecture_number: record.lecture_number,
            });

        if let Some(student_id) = resolved.get(record.student_identifier.as_str()) {
            *per_student
                .entry(*student_id)
                .or_default()
                .entry(record.subject.clone())
                .or_insert(0) += 1;
        }
    }

    let student_subject_counts = roster
        .iter()
        .map(|student| {
            let matched = per_student.remove(&student.id).unwrap_or_default();
            let counts = subject_counts
                .keys()
                .map(|subject| (subject.clone(), matched.get(subject).copied().unwrap_or(0)))
                .collect();
            StudentSubjectCounts {
                student_id: student.id,
                student_name: student.full_name.clone(),
                counts,
            }
        })
        .collect();

    let total_lectures_per_subject = sessions
        .into_iter()
        .map(|(subject, set)| (subject, set.len()))
        .collect();

    OverallStats {
        subject_counts,
        student_subject_counts,
        total_lectures_per_subject,
        unmatched_identifiers: unmatched,
    }
}

/// Recorded/Pending status for each scheduled slot of a day.
pub fn lecture_progress(
    date: NaiveDate,
    subjects_scheduled: &[String],
    records: &[AttendanceRecord],
) -> Vec<LectureProgress> {
    subjects_scheduled
        .iter()
        .enumerate()
        .map(|(idx, subject)| {
            let lecture_number = idx as i32 + 1;
            let done = records.iter().any(|record| {
                record.date == date
                    && record.lecture_number == lecture_number
                    && &record.subject == subject
            });
            LectureProgress {
                lecture_number,
                subject: subject.clone(),
                status: if done {
                    LectureStatus::Recorded
                } else {
                    LectureStatus::Pending
                },
            }
        })
        .collect()
}

/// Present/absent grid for the professor's subject. The sessions are the
/// distinct (date, lecture) pairs recorded since `since`, oldest first.
pub fn subject_dashboard(
    professor: &ProfessorContext,
    since: NaiveDate,
    records: &[AttendanceRecord],
    roster: &[Student],
) -> SubjectDashboard {
    let records: Vec<AttendanceRecord> = records
        .iter()
        .filter(|record| record.subject == professor.subject && record.date >= since)
        .cloned()
        .collect();
    let (resolved, _) = resolve_records(&records, roster);

    let sessions: Vec<LectureSession> = records
        .iter()
        .map(|record| LectureSession {
            date: record.date,
            lecture_number: record.lecture_number,
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: HashMap<LectureSession, usize> = sessions
        .iter()
        .enumerate()
        .map(|(idx, session)| (*session, idx))
        .collect();

    let mut present: HashMap<Uuid, Vec<bool>> = HashMap::new();
    for record in &records {
        let Some(student_id) = resolved.get(record.student_identifier.as_str()) else {
            continue;
        };
        let session = LectureSession {
            date: record.date,
            lecture_number: record.lecture_number,
        };
        if let Some(idx) = index.get(&session) {
            present
                .entry(*student_id)
                .or_insert_with(|| vec![false; sessions.len()])[*idx] = true;
        }
    }

    let rows = roster
        .iter()
        .map(|student| {
            let marks = present
                .remove(&student.id)
                .unwrap_or_else(|| vec![false; sessions.len()]);
            let attended = marks.iter().filter(|mark| **mark).count();
            DashboardRow {
                student_id: student.id,
                student_name: student.full_name.clone(),
                summary: StatSummary {
                    total_lectures: sessions.len(),
                    attended_lectures: attended,
                    percentage: percentage(attended, sessions.len()),
                },
                present: marks,
            }
        })
        .collect();

    SubjectDashboard {
        subject: professor.subject.clone(),
        since,
        sessions,
        rows,
    }
}

fn warn_unmatched(view: &str, unmatched: &[String]) {
    if !unmatched.is_empty() {
        warn!(
            "{}: {} stored identities match no enrolled student: {:?}",
            view,
            unmatched.len(),
            unmatched
        );
    }
}

pub async fn scheduled_subjects<S>(store: &S, date: NaiveDate) -> Result<Vec<String>>
where
    S: AttendanceStore + ?Sized,
{
    Ok(store
        .timetable_for(date.weekday())
        .await?
        .map(|entry| entry.subjects)
        .unwrap_or_default())
}

pub async fn load_daily_stats<S>(store: &S, date: NaiveDate) -> Result<DailyStats>
where
    S: AttendanceStore + ?Sized,
{
    let subjects = scheduled_subjects(store, date).await?;
    let records = store.attendance_for_date(date).await?;
    let roster = store.list_students().await?;
    let stats = daily_stats(date, &subjects, &records, &roster);
    warn_unmatched(&format!("daily view for {date}"), &stats.unmatched_identifiers);
    Ok(stats)
}

pub async fn load_overall_stats<S>(store: &S) -> Result<OverallStats>
where
    S: AttendanceStore + ?Sized,
{
    let records = store.all_attendance().await?;
    let roster = store.list_students().await?;
    let stats = overall_stats(&records, &roster);
    warn_unmatched("overall view", &stats.unmatched_identifiers);
    Ok(stats)
}

pub async fn load_lecture_progress<S>(store: &S, date: NaiveDate) -> Result<Vec<LectureProgress>>
where
    S: AttendanceStore + ?Sized,
{
    let subjects = scheduled_subjects(store, date).await?;
    let records = store.attendance_for_date(date).await?;
    Ok(lecture_progress(date, &subjects, &records))
}

pub async fn load_subject_dashboard<S>(
    store: &S,
    professor: &ProfessorContext,
    since: NaiveDate,
) -> Result<SubjectDashboard>
where
    S: AttendanceStore + ?Sized,
{
    let records = store
        .attendance_for_subject_since(&professor.subject, since)
        .await?;
    let roster = store.list_students().await?;
    Ok(subject_dashboard(professor, since, &records, &roster))
}
