use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::models::Student;

/// Which rule resolved an identifier. Variants are listed in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum MatchRule {
    ExactName,
    ExactRollNumber,
    CaseInsensitiveName,
    Containment,
}

impl MatchRule {
    pub fn is_exact(&self) -> bool {
        !matches!(self, MatchRule::Containment)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityMatch<'a> {
    pub student: &'a Student,
    pub rule: MatchRule,
}

/// Resolves a recognizer label to an enrolled student.
///
/// Each rule is tried against the whole roster before the next one, so an
/// exact name or roll number match always beats a containment match on an
/// earlier student. Within a rule the first student in roster order wins.
/// The exact rules compare the label as given; a label that only matches
/// once surrounding whitespace is stripped resolves as containment.
pub fn match_identity<'a>(identifier: &str, roster: &'a [Student]) -> Option<IdentityMatch<'a>> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(student) = roster.iter().find(|s| s.full_name == identifier) {
        return Some(IdentityMatch {
            student,
            rule: MatchRule::ExactName,
        });
    }

    if let Some(student) = roster
        .iter()
        .find(|s| !s.roll_number.is_empty() && s.roll_number == identifier)
    {
        return Some(IdentityMatch {
            student,
            rule: MatchRule::ExactRollNumber,
        });
    }

    let lowered = identifier.to_lowercase();
    if let Some(student) = roster
        .iter()
        .find(|s| s.full_name.to_lowercase() == lowered)
    {
        return Some(IdentityMatch {
            student,
            rule: MatchRule::CaseInsensitiveName,
        });
    }

    let needle = trimmed.to_lowercase();
    roster
        .iter()
        .find(|s| {
            let name = s.full_name.trim().to_lowercase();
            !name.is_empty() && (needle.contains(&name) || name.contains(&needle))
        })
        .map(|student| IdentityMatch {
            student,
            rule: MatchRule::Containment,
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedIdentity {
    pub identifier: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub rule: MatchRule,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    pub resolved: Vec<ResolvedIdentity>,
    pub unmatched: Vec<String>,
}

impl MatchReport {
    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }

    pub fn fuzzy_count(&self) -> usize {
        self.resolved.iter().filter(|r| !r.rule.is_exact()).count()
    }
}

/// Resolves a batch of identifiers, keeping every unmatched label so callers
/// can report it. Duplicate identifiers are resolved once.
pub fn resolve_all<'a, I>(identifiers: I, roster: &[Student]) -> MatchReport
where
    I: IntoIterator<Item = &'a str>,
{
    let unique: BTreeSet<&str> = identifiers.into_iter().collect();
    let mut report = MatchReport::default();

    for identifier in unique {
        match match_identity(identifier, roster) {
            Some(found) => report.resolved.push(ResolvedIdentity {
                identifier: identifier.to_string(),
                student_id: found.student.id,
                student_name: found.student.full_name.clone(),
                rule: found.rule,
            }),
            None => report.unmatched.push(identifier.to_string()),
        }
    }

    report
}

#[cfg(test)]
pub(crate) fn student(name: &str, roll: &str) -> Student {
    Student {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        roll_number: roll.to_string(),
        email: format!("{}@example.edu", roll.to_lowercase()),
        credential_hash: "hash".to_string(),
        alerts: Vec::new(),
    }
}
