use std::path::PathBuf;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use tracing::{info, warn};

use crate::error::{AttendanceError, Result};
use crate::models::{NewStudent, Student};
use crate::recognition::Recognizer;
use crate::store::AttendanceStore;

pub const MAX_ENROLLMENT_PHOTOS: usize = 5;
const PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone)]
pub struct EnrollRequest {
    pub full_name: String,
    pub roll_number: String,
    pub email: String,
    pub password: String,
    pub photos: Vec<PathBuf>,
}

pub fn hash_credential(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AttendanceError::Validation(format!("cannot hash password: {e}")))
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AttendanceError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

fn validate_photos(photos: &[PathBuf]) -> Result<()> {
    if photos.is_empty() {
        return Err(AttendanceError::Validation(
            "at least one photo is required".to_string(),
        ));
    }
    if photos.len() > MAX_ENROLLMENT_PHOTOS {
        return Err(AttendanceError::Validation(format!(
            "at most {MAX_ENROLLMENT_PHOTOS} photos are accepted, got {}",
            photos.len()
        )));
    }

    for photo in photos {
        let supported = photo
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| PHOTO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            return Err(AttendanceError::Validation(format!(
                "{} is not a jpg or png photo",
                photo.display()
            )));
        }
    }
    Ok(())
}

/// Adds a student to the roster and registers their photos with the
/// recognizer.
///
/// Every field is checked before anything is written. If the recognizer
/// rejects the photos the new student is removed again, so a student is
/// only enrolled when both sides know about them.
pub async fn enroll_student<S, R>(
    store: &S,
    recognizer: &R,
    request: &EnrollRequest,
) -> Result<Student>
where
    S: AttendanceStore + ?Sized,
    R: Recognizer + ?Sized,
{
    let full_name = required(&request.full_name, "name")?;
    let roll_number = required(&request.roll_number, "roll number")?;
    let email = required(&request.email, "email")?;
    if request.password.is_empty() {
        return Err(AttendanceError::Validation("password is required".to_string()));
    }
    validate_photos(&request.photos)?;

    let student = store
        .create_student(NewStudent {
            full_name: full_name.to_string(),
            roll_number: roll_number.to_string(),
            email: email.to_string(),
            credential_hash: hash_credential(&request.password)?,
        })
        .await?;

    if let Err(err) = recognizer
        .enroll(&student.full_name, &student.roll_number, &request.photos)
        .await
    {
        warn!(
            "Recognizer enrollment for {} failed, removing the student: {}",
            student.full_name, err
        );
        store.delete_student(student.id).await?;
        return Err(err);
    }

    info!(
        "Enrolled {} ({}) with {} photos",
        student.full_name,
        student.roll_number,
        request.photos.len()
    );
    Ok(student)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use argon2::{PasswordHash, PasswordVerifier};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    use crate::recognition::SamplingParams;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct RecordingRecognizer {
        enrolled: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait]
    impl Recognizer for RecordingRecognizer {
        async fn recognize(&self, _video: &Path, _params: SamplingParams) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn enroll(&self, name: &str, roll_number: &str, photos: &[PathBuf]) -> Result<()> {
            self.enrolled
                .lock()
                .await
                .push((name.to_string(), roll_number.to_string(), photos.len()));
            Ok(())
        }
    }

    struct RejectingRecognizer;

    #[async_trait]
    impl Recognizer for RejectingRecognizer {
        async fn recognize(&self, _video: &Path, _params: SamplingParams) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn enroll(&self, _name: &str, _roll: &str, _photos: &[PathBuf]) -> Result<()> {
            Err(AttendanceError::Upstream(
                "recognizer answered 500: Failed to generate embeddings".to_string(),
            ))
        }
    }

    fn request(dir: &TempDir) -> EnrollRequest {
        let photo = dir.path().join("front.jpg");
        std::fs::write(&photo, b"fake photo").unwrap();
        EnrollRequest {
            full_name: "Alice Roy".to_string(),
            roll_number: "R1".to_string(),
            email: "alice@example.edu".to_string(),
            password: "correct horse".to_string(),
            photos: vec![photo],
        }
    }

    #[tokio::test]
    async fn enrolled_student_gets_hashed_credential_and_recognizer_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let recognizer = RecordingRecognizer::default();

        let student = enroll_student(&store, &recognizer, &request(&dir)).await.unwrap();

        assert_eq!(student.full_name, "Alice Roy");
        assert_ne!(student.credential_hash, "correct horse");
        let parsed = PasswordHash::new(&student.credential_hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"correct horse", &parsed)
            .is_ok());

        assert_eq!(store.list_students().await.unwrap().len(), 1);
        assert_eq!(
            *recognizer.enrolled.lock().await,
            vec![("Alice Roy".to_string(), "R1".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let recognizer = RecordingRecognizer::default();

        let mut blanks = Vec::new();
        for field in 0..4 {
            let mut req = request(&dir);
            match field {
                0 => req.full_name = "  ".to_string(),
                1 => req.roll_number = String::new(),
                2 => req.email = String::new(),
                _ => req.password = String::new(),
            }
            blanks.push(req);
        }

        for req in &blanks {
            let err = enroll_student(&store, &recognizer, req).await.unwrap_err();
            assert!(matches!(err, AttendanceError::Validation(_)));
        }
        assert!(store.list_students().await.unwrap().is_empty());
        assert!(recognizer.enrolled.lock().await.is_empty());
    }

    #[tokio::test]
    async fn photos_must_be_present_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let recognizer = RecordingRecognizer::default();

        let mut none = request(&dir);
        none.photos.clear();
        let err = enroll_student(&store, &recognizer, &none).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));

        let mut wrong = request(&dir);
        wrong.photos = vec![dir.path().join("clip.mp4")];
        let err = enroll_student(&store, &recognizer, &wrong).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));

        let mut too_many = request(&dir);
        too_many.photos = vec![too_many.photos[0].clone(); MAX_ENROLLMENT_PHOTOS + 1];
        let err = enroll_student(&store, &recognizer, &too_many).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));

        assert!(store.list_students().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let recognizer = RecordingRecognizer::default();

        enroll_student(&store, &recognizer, &request(&dir)).await.unwrap();
        let err = enroll_student(&store, &recognizer, &request(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, AttendanceError::Validation(_)));
        assert_eq!(store.list_students().await.unwrap().len(), 1);
        assert_eq!(recognizer.enrolled.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn recognizer_rejection_removes_the_new_student() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let err = enroll_student(&store, &RejectingRecognizer, &request(&dir))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(store.list_students().await.unwrap().is_empty());
    }
}
