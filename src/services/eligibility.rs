// src/services/eligibility.rs

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{
    attempt::{Attempt, AttemptStatus},
    exam::Exam,
};

/// Why a student may not start the exam right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    NotPublished,
    NotYetOpen { opens_at: DateTime<Utc> },
    Closed { closed_at: DateTime<Utc> },
    AlreadyCompleted { attempt_id: i64 },
}

impl DenialReason {
    pub fn message(&self) -> String {
        match self {
            DenialReason::NotPublished => "Exam is not published".to_string(),
            DenialReason::NotYetOpen { opens_at } => {
                format!("Exam opens at {}", opens_at.to_rfc3339())
            }
            DenialReason::Closed { closed_at } => {
                format!("Exam closed at {}", closed_at.to_rfc3339())
            }
            DenialReason::AlreadyCompleted { .. } => {
                "Exam already completed and does not allow multiple attempts".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Eligibility {
    /// Continue the attempt that is still running.
    Resume { attempt_id: i64 },
    /// Start a fresh attempt. Listed attempts are abandoned `in_progress`
    /// ones that should be closed first.
    StartNew { stale_attempt_ids: Vec<i64> },
    Denied(DenialReason),
}

/// Timing knobs for the check.
#[derive(Debug, Clone, Copy)]
pub struct AttemptWindow {
    /// Trailing window in which an `in_progress` attempt may be resumed.
    pub resume_window: Duration,
    /// Tolerance past an attempt's own deadline.
    pub grace: Duration,
}

impl AttemptWindow {
    pub fn new(resume_window_minutes: i64, grace_seconds: i64) -> Self {
        Self {
            resume_window: Duration::minutes(resume_window_minutes),
            grace: Duration::seconds(grace_seconds),
        }
    }
}

/// Moment an attempt started at `started_at` runs out of time: its duration,
/// capped by the exam's closing time.
pub fn attempt_deadline(exam: &Exam, started_at: DateTime<Utc>) -> DateTime<Utc> {
    let by_duration = started_at + Duration::minutes(exam.duration_minutes);
    match exam.end_time {
        Some(end_time) if end_time < by_duration => end_time,
        _ => by_duration,
    }
}

/// Decides whether `attempts` (all of one user's attempts on `exam`) allow a
/// new or resumed attempt at `now`.
///
/// Fails closed: unpublished or out-of-window exams are denied before any
/// attempt is looked at.
pub fn can_start_attempt(
    exam: &Exam,
    attempts: &[Attempt],
    now: DateTime<Utc>,
    window: AttemptWindow,
) -> Eligibility {
    if !exam.is_published {
        return Eligibility::Denied(DenialReason::NotPublished);
    }

    if let Some(start_time) = exam.start_time {
        if now < start_time {
            return Eligibility::Denied(DenialReason::NotYetOpen {
                opens_at: start_time,
            });
        }
    }

    if let Some(end_time) = exam.end_time {
        if now > end_time {
            return Eligibility::Denied(DenialReason::Closed {
                closed_at: end_time,
            });
        }
    }

    let resumable = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::InProgress)
        .filter(|a| is_resumable(exam, a, now, window))
        .max_by_key(|a| a.started_at);

    if let Some(attempt) = resumable {
        return Eligibility::Resume {
            attempt_id: attempt.id,
        };
    }

    if !exam.allow_multiple_attempts {
        if let Some(done) = attempts
            .iter()
            .find(|a| a.status == AttemptStatus::Completed)
        {
            return Eligibility::Denied(DenialReason::AlreadyCompleted {
                attempt_id: done.id,
            });
        }
    }

    Eligibility::StartNew {
        stale_attempt_ids: attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::InProgress)
            .map(|a| a.id)
            .collect(),
    }
}

/// Whether a student may see the answer key of `attempt`.
///
/// Never while any of their attempts on the exam is still `in_progress`.
/// A `completed` attempt shows its key; an `ended` one only once no new
/// start is possible, since ending does not use up a single-attempt exam.
pub fn answers_revealed(
    exam: &Exam,
    attempt: &Attempt,
    attempts: &[Attempt],
    now: DateTime<Utc>,
    window: AttemptWindow,
) -> bool {
    if attempts.iter().any(|a| a.status == AttemptStatus::InProgress) {
        return false;
    }
    match attempt.status {
        AttemptStatus::InProgress => false,
        AttemptStatus::Completed => true,
        AttemptStatus::Ended => matches!(
            can_start_attempt(exam, attempts, now, window),
            Eligibility::Denied(_)
        ),
    }
}

fn is_resumable(exam: &Exam, attempt: &Attempt, now: DateTime<Utc>, window: AttemptWindow) -> bool {
    now - attempt.started_at <= window.resume_window
        && now <= attempt_deadline(exam, attempt.started_at) + window.grace
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn exam() -> Exam {
        Exam {
            id: 1,
            title: "Algebra".into(),
            description: None,
            duration_minutes: 180,
            passing_score: 60,
            is_published: true,
            start_time: None,
            end_time: None,
            allow_multiple_attempts: false,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn attempt(id: i64, status: AttemptStatus, minutes_ago: i64) -> Attempt {
        Attempt {
            id,
            user_id: 7,
            exam_id: 1,
            status,
            score: None,
            max_score: None,
            percentage: None,
            passed: None,
            started_at: now() - Duration::minutes(minutes_ago),
            completed_at: None,
        }
    }

    fn window() -> AttemptWindow {
        AttemptWindow::new(120, 60)
    }

    #[test]
    fn test_unpublished_fails_closed() {
        let mut exam = exam();
        exam.is_published = false;
        let attempts = vec![attempt(1, AttemptStatus::InProgress, 5)];
        assert_eq!(
            can_start_attempt(&exam, &attempts, now(), window()),
            Eligibility::Denied(DenialReason::NotPublished)
        );
    }

    #[test]
    fn test_schedule_window() {
        let mut exam = exam();
        exam.start_time = Some(now() + Duration::hours(1));
        assert!(matches!(
            can_start_attempt(&exam, &[], now(), window()),
            Eligibility::Denied(DenialReason::NotYetOpen { .. })
        ));

        exam.start_time = Some(now() - Duration::hours(3));
        exam.end_time = Some(now() - Duration::minutes(1));
        assert!(matches!(
            can_start_attempt(&exam, &[], now(), window()),
            Eligibility::Denied(DenialReason::Closed { .. })
        ));

        exam.end_time = Some(now() + Duration::hours(1));
        assert_eq!(
            can_start_attempt(&exam, &[], now(), window()),
            Eligibility::StartNew { stale_attempt_ids: vec![] }
        );
    }

    #[test]
    fn test_resume_recent_attempt() {
        let attempts = vec![
            attempt(1, AttemptStatus::InProgress, 100),
            attempt(2, AttemptStatus::InProgress, 30),
        ];
        assert_eq!(
            can_start_attempt(&exam(), &attempts, now(), window()),
            Eligibility::Resume { attempt_id: 2 }
        );
    }

    #[test]
    fn test_stale_attempt_outside_window() {
        let attempts = vec![attempt(3, AttemptStatus::InProgress, 121)];
        assert_eq!(
            can_start_attempt(&exam(), &attempts, now(), window()),
            Eligibility::StartNew { stale_attempt_ids: vec![3] }
        );
    }

    #[test]
    fn test_attempt_past_its_own_deadline_is_stale() {
        let mut exam = exam();
        exam.duration_minutes = 30;
        let attempts = vec![attempt(4, AttemptStatus::InProgress, 45)];
        assert_eq!(
            can_start_attempt(&exam, &attempts, now(), window()),
            Eligibility::StartNew { stale_attempt_ids: vec![4] }
        );
    }

    #[test]
    fn test_completed_blocks_single_attempt_exam() {
        let attempts = vec![attempt(5, AttemptStatus::Completed, 300)];
        assert_eq!(
            can_start_attempt(&exam(), &attempts, now(), window()),
            Eligibility::Denied(DenialReason::AlreadyCompleted { attempt_id: 5 })
        );

        let mut exam = exam();
        exam.allow_multiple_attempts = true;
        assert_eq!(
            can_start_attempt(&exam, &attempts, now(), window()),
            Eligibility::StartNew { stale_attempt_ids: vec![] }
        );
    }

    #[test]
    fn test_resume_wins_over_completed() {
        let attempts = vec![
            attempt(6, AttemptStatus::Completed, 300),
            attempt(7, AttemptStatus::InProgress, 10),
        ];
        assert_eq!(
            can_start_attempt(&exam(), &attempts, now(), window()),
            Eligibility::Resume { attempt_id: 7 }
        );
    }

    #[test]
    fn test_ended_does_not_block() {
        let attempts = vec![attempt(8, AttemptStatus::Ended, 500)];
        assert_eq!(
            can_start_attempt(&exam(), &attempts, now(), window()),
            Eligibility::StartNew { stale_attempt_ids: vec![] }
        );
    }

    #[test]
    fn test_deadline_capped_by_end_time() {
        let mut exam = exam();
        exam.end_time = Some(now() + Duration::minutes(10));
        assert_eq!(attempt_deadline(&exam, now()), now() + Duration::minutes(10));
        exam.end_time = None;
        assert_eq!(attempt_deadline(&exam, now()), now() + Duration::minutes(180));
    }

    #[test]
    fn test_ended_attempt_hides_key_while_a_retake_is_possible() {
        let ended = attempt(9, AttemptStatus::Ended, 200);
        assert!(!answers_revealed(&exam(), &ended, &[ended.clone()], now(), window()));

        let mut closed = exam();
        closed.end_time = Some(now() - Duration::minutes(5));
        assert!(answers_revealed(&closed, &ended, &[ended.clone()], now(), window()));

        let completed = attempt(10, AttemptStatus::Completed, 100);
        let attempts = vec![ended.clone(), completed.clone()];
        assert!(answers_revealed(&exam(), &ended, &attempts, now(), window()));
        assert!(answers_revealed(&exam(), &completed, &attempts, now(), window()));
    }

    #[test]
    fn test_key_hidden_while_another_attempt_runs() {
        let mut exam = exam();
        exam.allow_multiple_attempts = true;
        let completed = attempt(11, AttemptStatus::Completed, 300);
        let running = attempt(12, AttemptStatus::InProgress, 5);
        let attempts = vec![completed.clone(), running.clone()];
        assert!(!answers_revealed(&exam, &completed, &attempts, now(), window()));
        assert!(!answers_revealed(&exam, &running, &attempts, now(), window()));
        assert!(answers_revealed(&exam, &completed, &[completed.clone()], now(), window()));
    }
}
