use std::fmt::Write;

use crate::models::{Bucket, DailyStats, OverallStats, SubjectDashboard};
use crate::stats;

pub fn build_daily_report(daily: &DailyStats) -> String {
    let groups = stats::group_by_bucket(&daily.students);
    let mut output = String::new();

    let _ = writeln!(output, "# Daily Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} lectures scheduled)",
        daily.date,
        daily.subjects_scheduled.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Schedule");

    if daily.subjects_scheduled.is_empty() {
        let _ = writeln!(output, "No lectures scheduled for this day.");
    } else {
        for (idx, subject) in daily.subjects_scheduled.iter().enumerate() {
            let _ = writeln!(output, "- Lecture {}: {}", idx + 1, subject);
        }
    }

    for bucket in Bucket::ALL {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", bucket.label());
        let members = groups.get(&bucket).map(Vec::as_slice).unwrap_or_default();

        if members.is_empty() {
            let _ = writeln!(output, "No students in this band.");
            continue;
        }

        for stat in members {
            let lectures: Vec<String> = stat
                .attended_lectures
                .iter()
                .map(|l| format!("L{} {}", l.lecture_number, l.subject))
                .collect();
            let _ = writeln!(
                output,
                "- {} ({}) {}% ({}/{}){}",
                stat.student_name,
                stat.roll_number,
                stat.summary.percentage,
                stat.summary.attended_lectures,
                stat.summary.total_lectures,
                if lectures.is_empty() {
                    String::new()
                } else {
                    format!(": {}", lectures.join(", "))
                }
            );
        }
    }

    write_unmatched(&mut output, &daily.unmatched_identifiers);
    output
}

pub fn build_overall_report(overall: &OverallStats) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Overall Attendance Report");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if overall.subject_counts.is_empty() {
        let _ = writeln!(output, "No attendance recorded yet.");
        return output;
    }

    for (subject, count) in &overall.subject_counts {
        let sessions = overall
            .total_lectures_per_subject
            .get(subject)
            .copied()
            .unwrap_or(0);
        let _ = writeln!(
            output,
            "- {}: {} attendance marks across {} lectures",
            subject, count, sessions
        );
    }

    let subjects: Vec<&String> = overall.subject_counts.keys().collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");
    let _ = writeln!(
        output,
        "| Student | {} |",
        subjects
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    );
    let _ = writeln!(output, "|---|{}", "---|".repeat(subjects.len()));

    for row in &overall.student_subject_counts {
        let cells: Vec<String> = subjects
            .iter()
            .map(|subject| {
                let attended = row.counts.get(*subject).copied().unwrap_or(0);
                let total = overall
                    .total_lectures_per_subject
                    .get(*subject)
                    .copied()
                    .unwrap_or(0);
                format!("{}/{} ({}%)", attended, total, stats::percentage(attended, total))
            })
            .collect();
        let _ = writeln!(output, "| {} | {} |", row.student_name, cells.join(" | "));
    }

    write_unmatched(&mut output, &overall.unmatched_identifiers);
    output
}

pub fn build_dashboard_report(dashboard: &SubjectDashboard) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} Attendance", dashboard.subject);
    let _ = writeln!(output, "Lectures since {}", dashboard.since);
    let _ = writeln!(output);

    if dashboard.sessions.is_empty() {
        let _ = writeln!(output, "No lectures recorded for this window.");
        return output;
    }

    let headers: Vec<String> = dashboard.sessions.iter().map(|s| s.to_string()).collect();
    let _ = writeln!(output, "| Student | {} | Attended |", headers.join(" | "));
    let _ = writeln!(output, "|---|{}---|", "---|".repeat(headers.len()));

    for row in &dashboard.rows {
        let marks: Vec<&str> = row
            .present
            .iter()
            .map(|present| if *present { "Present" } else { "Absent" })
            .collect();
        let _ = writeln!(
            output,
            "| {} | {} | {}/{} ({}%) |",
            row.student_name,
            marks.join(" | "),
            row.summary.attended_lectures,
            row.summary.total_lectures,
            row.summary.percentage
        );
    }

    output
}

fn write_unmatched(output: &mut String, unmatched: &[String]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Unmatched Identities");

    if unmatched.is_empty() {
        let _ = writeln!(output, "Every recorded identity matched an enrolled student.");
    } else {
        for identifier in unmatched {
            let _ = writeln!(output, "- {}", identifier);
        }
    }
}
