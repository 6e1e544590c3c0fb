use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AttendanceError, Result};
use crate::models::{Alert, Priority, ProfessorContext};
use crate::store::AttendanceStore;

pub async fn send_alert<S>(
    store: &S,
    professor: &ProfessorContext,
    student_id: Uuid,
    message: &str,
    priority: Option<Priority>,
) -> Result<Alert>
where
    S: AttendanceStore + ?Sized,
{
    let message = message.trim();
    if message.is_empty() {
        return Err(AttendanceError::Validation(
            "alert message is required".to_string(),
        ));
    }

    let student = store
        .find_student(student_id)
        .await?
        .ok_or_else(|| AttendanceError::NotFound(format!("student {student_id}")))?;

    let alert = Alert {
        id: Uuid::new_v4(),
        professor_name: professor.name.clone(),
        subject: professor.subject.clone(),
        message: message.to_string(),
        priority: priority.unwrap_or_default(),
        created_at: Utc::now(),
        read: false,
    };

    store.append_alert(student.id, &alert).await?;
    info!(
        "{} ({}) sent a {} priority alert to {}",
        professor.name, professor.professor_id, alert.priority, student.full_name
    );

    Ok(alert)
}

pub async fn alerts_for_student<S>(store: &S, student_id: Uuid) -> Result<Vec<Alert>>
where
    S: AttendanceStore + ?Sized,
{
    store
        .find_student(student_id)
        .await?
        .map(|student| student.alerts)
        .ok_or_else(|| AttendanceError::NotFound(format!("student {student_id}")))
}

pub async fn mark_read<S>(store: &S, student_id: Uuid, alert_id: Uuid) -> Result<()>
where
    S: AttendanceStore + ?Sized,
{
    if !store.mark_alert_read(student_id, alert_id).await? {
        return Err(AttendanceError::NotFound(format!("alert {alert_id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewStudent;
    use crate::store::{professor_context, MemoryStore};

    async fn setup() -> (MemoryStore, ProfessorContext, Uuid) {
        let store = MemoryStore::new();
        let professor = store.add_professor("Dr. Rao", "rao@example.edu", "Math").await;
        let student = store
            .create_student(NewStudent {
                full_name: "Alice Roy".to_string(),
                roll_number: "R1".to_string(),
                email: "alice@example.edu".to_string(),
                credential_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let context = professor_context(&store, professor.id).await.unwrap();
        (store, context, student.id)
    }

    #[tokio::test]
    async fn alert_carries_professor_context() {
        let (store, context, student_id) = setup().await;
        let alert = send_alert(&store, &context, student_id, "  Attendance below 50%  ", None)
            .await
            .unwrap();

        assert_eq!(alert.message, "Attendance below 50%");
        assert_eq!(alert.priority, Priority::Medium);
        assert_eq!(alert.subject, "Math");
        assert!(!alert.read);

        let alerts = alerts_for_student(&store, student_id).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].professor_name, "Dr. Rao");
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (store, context, student_id) = setup().await;
        let err = send_alert(&store, &context, student_id, "   ", Some(Priority::High))
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));
        assert!(alerts_for_student(&store, student_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_student_or_professor_is_not_found() {
        let (store, context, _) = setup().await;
        let err = send_alert(&store, &context, Uuid::new_v4(), "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));

        let err = professor_context(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));
    }

    #[tokio::test]
    async fn alerts_can_be_marked_read() {
        let (store, context, student_id) = setup().await;
        let alert = send_alert(&store, &context, student_id, "See me", Some(Priority::High))
            .await
            .unwrap();

        mark_read(&store, student_id, alert.id).await.unwrap();
        let alerts = alerts_for_student(&store, student_id).await.unwrap();
        assert!(alerts[0].read);

        let err = mark_read(&store, student_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));
    }
}
