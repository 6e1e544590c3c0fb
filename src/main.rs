use std::path::PathBuf;

use chrono::{NaiveDate, Utc, Weekday};
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

mod alerts;
mod config;
mod db;
mod enrollment;
mod error;
mod matcher;
mod models;
mod recognition;
mod recorder;
mod report;
mod stats;
mod store;

use crate::config::AppConfig;
use crate::db::PgStore;
use crate::models::{LectureStatus, Priority, TimetableEntry};
use crate::recognition::{HttpRecognizer, SamplingParams};
use crate::store::{professor_context, AttendanceStore, RecordFilter};

#[derive(Parser)]
#[command(name = "lecture-attendance")]
#[command(about = "Lecture attendance from face recognition results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import students from a CSV file
    ImportRoster {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Add or update a professor
    AddProfessor {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
    },
    /// Enroll a student and register their photos with the recognizer
    Enroll {
        #[arg(long)]
        name: String,
        #[arg(long)]
        roll_number: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Reference photo (jpg or png); repeat for up to five
        #[arg(long = "photo")]
        photos: Vec<PathBuf>,
    },
    /// List enrolled students in roster order
    Students,
    /// Remove a student
    RemoveStudent {
        #[arg(long)]
        id: Uuid,
    },
    /// Set the ordered subjects for a weekday
    SetTimetable {
        #[arg(long)]
        day: Weekday,
        /// Comma-separated, lecture 1 first
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,
    },
    /// Run a lecture video through recognition and record attendance
    Upload {
        #[arg(long)]
        video: PathBuf,
        #[arg(long)]
        lecture: i32,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = 1.0)]
        sample_fps: f64,
        #[arg(long, default_value_t = 1)]
        min_frames: u32,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record attendance by hand for one lecture
    Record {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        lecture: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Comma-separated identities as they should be stored
        #[arg(long, value_delimiter = ',', required = true)]
        students: Vec<String>,
    },
    /// Show which of the day's lectures have been recorded
    Status {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Daily analysis grouped into attendance bands
    Daily {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "daily-report.md")]
        out: PathBuf,
        /// Print JSON to stdout instead of writing a report
        #[arg(long)]
        json: bool,
    },
    /// All-time analysis per subject and per student
    Overall {
        #[arg(long, default_value = "overall-report.md")]
        out: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Present/absent grid for a professor's subject
    Dashboard {
        #[arg(long)]
        professor: Uuid,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the most recent attendance records
    Records {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        lecture: Option<i32>,
    },
    /// Send an alert from a professor to a student
    Alert {
        #[arg(long)]
        professor: Uuid,
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        message: String,
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// List a student's alerts
    Alerts {
        #[arg(long)]
        student: Uuid,
    },
    /// Mark one of a student's alerts as read
    MarkRead {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        alert: Uuid,
    },
    /// Check that the recognition service is reachable
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lecture_attendance=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Health => check_health(&config).await,
        command => {
            let store = PgStore::connect(&config).await?;
            run(command, &config, &store).await
        }
    }
}

async fn check_health(config: &AppConfig) -> anyhow::Result<()> {
    let recognizer = HttpRecognizer::new(&config.recognition_url, config.recognition_timeout)?;
    match recognizer.health().await {
        Ok(true) => println!("Recognition service at {} is healthy.", config.recognition_url),
        Ok(false) => println!(
            "Recognition service at {} answered but is not healthy.",
            config.recognition_url
        ),
        Err(err) => println!(
            "Recognition service at {} is unreachable: {}",
            config.recognition_url, err
        ),
    }
    Ok(())
}

async fn run(command: Commands, config: &AppConfig, store: &PgStore) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();

    match command {
        Commands::InitDb => {
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store.seed().await?;
            println!("Seed data inserted.");
        }
        Commands::ImportRoster { csv } => {
            let inserted = store.import_roster(&csv).await?;
            println!("Enrolled {inserted} students from {}.", csv.display());
        }
        Commands::AddProfessor {
            name,
            email,
            subject,
        } => {
            let professor = store.create_professor(&name, &email, &subject).await?;
            println!(
                "Professor {} ({}) teaches {} [{}].",
                professor.name, professor.email, professor.subject, professor.id
            );
        }
        Commands::Enroll {
            name,
            roll_number,
            email,
            password,
            photos,
        } => {
            let recognizer =
                HttpRecognizer::new(&config.recognition_url, config.recognition_timeout)?;
            let request = enrollment::EnrollRequest {
                full_name: name,
                roll_number,
                email,
                password,
                photos,
            };
            let student = enrollment::enroll_student(store, &recognizer, &request).await?;
            println!(
                "Enrolled {} ({}) [{}].",
                student.full_name, student.roll_number, student.id
            );
        }
        Commands::Students => {
            let roster = store.list_students().await?;
            if roster.is_empty() {
                println!("No students enrolled.");
                return Ok(());
            }

            for student in roster {
                let credential = if student.credential_hash == db::UNSET_CREDENTIAL {
                    " (no password set)"
                } else {
                    ""
                };
                println!(
                    "- {} {} ({}, {}){}",
                    student.id, student.full_name, student.roll_number, student.email, credential
                );
            }
        }
        Commands::RemoveStudent { id } => {
            if store.delete_student(id).await? {
                println!("Student {id} removed.");
            } else {
                return Err(error::AttendanceError::NotFound(format!("student {id}")).into());
            }
        }
        Commands::SetTimetable { day, subjects } => {
            let subjects: Vec<String> = subjects
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            store
                .upsert_timetable(&TimetableEntry {
                    weekday: day,
                    subjects: subjects.clone(),
                })
                .await?;
            println!("{}: {}", models::weekday_name(day), subjects.join(", "));
        }
        Commands::Upload {
            video,
            lecture,
            date,
            sample_fps,
            min_frames,
            json,
        } => {
            let recognizer =
                HttpRecognizer::new(&config.recognition_url, config.recognition_timeout)?;
            let request = recorder::UploadRequest {
                video,
                lecture_number: lecture,
                date: date.unwrap_or(today),
                params: SamplingParams {
                    sample_fps,
                    min_confidence_frames: min_frames,
                },
            };
            info!("Processing upload for lecture {}", request.lecture_number);
            let result = match recorder::record_upload(store, &recognizer, &request).await {
                Ok(result) => result,
                Err(err) if err.is_retryable() => {
                    return Err(anyhow::Error::new(err)
                        .context("recognition failed, nothing was recorded; the upload can be retried"));
                }
                Err(err) => return Err(anyhow::Error::new(err).context("video upload failed")),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!(
                "{} lecture {}: {} recognized, {} recorded, {} already present, {} fuzzy matches.",
                result.subject,
                result.lecture_number,
                result.recognized.len(),
                result.outcome.created,
                result.outcome.skipped,
                result.matches.fuzzy_count()
            );
            for resolved in &result.matches.resolved {
                println!(
                    "- {} -> {} ({:?})",
                    resolved.identifier, resolved.student_name, resolved.rule
                );
            }
            for identifier in &result.matches.unmatched {
                println!("- {identifier} -> no enrolled student");
            }
        }
        Commands::Record {
            subject,
            lecture,
            date,
            students,
        } => {
            let date = date.unwrap_or(today);
            let outcome = recorder::record(store, &subject, lecture, date, &students).await?;
            println!(
                "{subject} lecture {lecture} on {date}: {} recorded, {} skipped.",
                outcome.created, outcome.skipped
            );
        }
        Commands::Status { date } => {
            let date = date.unwrap_or(today);
            let progress = stats::load_lecture_progress(store, date).await?;
            if progress.is_empty() {
                println!("No lectures scheduled for {date}.");
                return Ok(());
            }

            println!("Lectures on {date}:");
            for lecture in progress {
                let status = match lecture.status {
                    LectureStatus::Recorded => "recorded",
                    LectureStatus::Pending => "pending",
                };
                println!("- {}: {} ({})", lecture.lecture_number, lecture.subject, status);
            }
        }
        Commands::Daily { date, out, json } => {
            let daily = stats::load_daily_stats(store, date.unwrap_or(today)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&daily)?);
                return Ok(());
            }
            std::fs::write(&out, report::build_daily_report(&daily))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Overall { out, json } => {
            let overall = stats::load_overall_stats(store).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overall)?);
                return Ok(());
            }
            std::fs::write(&out, report::build_overall_report(&overall))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Dashboard {
            professor,
            since_days,
            out,
            json,
        } => {
            let since = stats::cutoff_date(since_days);
            let context = professor_context(store, professor).await?;
            let dashboard = stats::load_subject_dashboard(store, &context, since).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
                return Ok(());
            }
            std::fs::write(&out, report::build_dashboard_report(&dashboard))?;
            println!("Dashboard written to {}.", out.display());
        }
        Commands::Records { date, lecture } => {
            let records = store
                .recent_attendance(&RecordFilter {
                    date,
                    lecture_number: lecture,
                })
                .await?;
            if records.is_empty() {
                println!("No attendance records match.");
                return Ok(());
            }

            for record in records {
                println!(
                    "- {} lecture {} {}: {}",
                    record.date, record.lecture_number, record.subject, record.student_identifier
                );
            }
        }
        Commands::Alert {
            professor,
            student,
            message,
            priority,
        } => {
            let context = professor_context(store, professor).await?;
            let alert = alerts::send_alert(store, &context, student, &message, priority).await?;
            println!("Alert {} sent ({} priority).", alert.id, alert.priority);
        }
        Commands::Alerts { student } => {
            let list = alerts::alerts_for_student(store, student).await?;
            if list.is_empty() {
                println!("No alerts.");
                return Ok(());
            }

            for alert in list {
                println!(
                    "- [{}] {} {} ({}, {}): {}",
                    if alert.read { "read" } else { "new" },
                    alert.created_at.format("%Y-%m-%d %H:%M"),
                    alert.professor_name,
                    alert.subject,
                    alert.priority,
                    alert.message
                );
            }
        }
        Commands::MarkRead { student, alert } => {
            alerts::mark_read(store, student, alert).await?;
            println!("Alert {alert} marked read.");
        }
        Commands::Health => check_health(config).await?,
    }

    Ok(())
}
