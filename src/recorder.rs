use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AttendanceError, Result};
use crate::matcher::{self, MatchReport};
use crate::models::{RecordOutcome, MAX_LECTURE_NUMBER, MIN_LECTURE_NUMBER};
use crate::recognition::{Recognizer, SamplingParams};
use crate::store::{AttendanceBatch, AttendanceStore};

pub const UNKNOWN_SUBJECT: &str = "Unknown";

pub fn validate_lecture_number(lecture_number: i32) -> Result<()> {
    if !(MIN_LECTURE_NUMBER..=MAX_LECTURE_NUMBER).contains(&lecture_number) {
        return Err(AttendanceError::Validation(format!(
            "lecture number must be between {MIN_LECTURE_NUMBER} and {MAX_LECTURE_NUMBER}, got {lecture_number}"
        )));
    }
    Ok(())
}

/// Stores one fact per identity for the given lecture slot. Identities are
/// kept verbatim; an identity already recorded for the same slot is skipped,
/// and blank identities are skipped without being stored.
pub async fn record<S>(
    store: &S,
    subject: &str,
    lecture_number: i32,
    date: NaiveDate,
    identities: &[String],
) -> Result<RecordOutcome>
where
    S: AttendanceStore + ?Sized,
{
    validate_lecture_number(lecture_number)?;
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(AttendanceError::Validation("subject is required".to_string()));
    }

    let (kept, blank): (Vec<&String>, Vec<&String>) =
        identities.iter().partition(|identity| !identity.trim().is_empty());

    let batch = AttendanceBatch {
        subject: subject.to_string(),
        lecture_number,
        date,
        identities: kept.into_iter().cloned().collect(),
        recorded_at: Utc::now(),
    };

    let mut outcome = store.insert_attendance_batch(&batch).await?;
    outcome.skipped += blank.len();

    info!(
        "Recorded {} identities for {} lecture {} on {}: {} created, {} skipped",
        identities.len(),
        subject,
        lecture_number,
        date,
        outcome.created,
        outcome.skipped
    );

    Ok(outcome)
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub video: PathBuf,
    pub lecture_number: i32,
    pub date: NaiveDate,
    pub params: SamplingParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub subject: String,
    pub lecture_number: i32,
    pub recognized: Vec<String>,
    pub outcome: RecordOutcome,
    pub matches: MatchReport,
}

/// Runs a lecture video through the recognizer and records the result.
///
/// The subject comes from the timetable slot for the date's weekday. The
/// video file is removed whether or not the upload succeeds. Nothing is
/// written when validation or recognition fails.
pub async fn record_upload<S, R>(
    store: &S,
    recognizer: &R,
    request: &UploadRequest,
) -> Result<UploadOutcome>
where
    S: AttendanceStore + ?Sized,
    R: Recognizer + ?Sized,
{
    let result = process_upload(store, recognizer, request).await;

    if let Err(err) = tokio::fs::remove_file(&request.video).await {
        warn!("Could not remove uploaded video {}: {}", request.video.display(), err);
    }

    if let Err(err) = &result {
        warn!("Upload for lecture {} failed: {}", request.lecture_number, err);
    }

    result
}

async fn process_upload<S, R>(
    store: &S,
    recognizer: &R,
    request: &UploadRequest,
) -> Result<UploadOutcome>
where
    S: AttendanceStore + ?Sized,
    R: Recognizer + ?Sized,
{
    validate_lecture_number(request.lecture_number)?;

    let subject = store
        .timetable_for(request.date.weekday())
        .await?
        .and_then(|entry| entry.subject_for(request.lecture_number).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());

    let recognized = recognizer.recognize(&request.video, request.params).await?;

    let outcome = record(
        store,
        &subject,
        request.lecture_number,
        request.date,
        &recognized,
    )
    .await?;

    let roster = store.list_students().await?;
    let matches = matcher::resolve_all(recognized.iter().map(String::as_str), &roster);
    if matches.unmatched_count() > 0 {
        warn!(
            "{} recognized identities match no enrolled student: {:?}",
            matches.unmatched_count(),
            matches.unmatched
        );
    }

    Ok(UploadOutcome {
        subject,
        lecture_number: request.lecture_number,
        recognized,
        outcome,
        matches,
    })
}
