//! crates/study_companion_core/src/session.rs
//!
//! Ephemeral, per-user study state. Nothing here is persisted; the caller
//! owns a `StudySession` and passes it explicitly from mode selection into
//! the study screen.

use uuid::Uuid;

use crate::domain::QuizQuestion;
use crate::timer::StudyTimer;

/// The study technique picked before entering a study mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyStyle {
    Pomodoro,
    Candle,
    SpacedRepetition,
}

/// The ways a reviewer can be studied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyMode {
    Flashcards,
    Quiz,
    Summary,
}

/// What mode selection hands to the study screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudySession {
    pub reviewer_id: Uuid,
    pub style: Option<StudyStyle>,
    pub mode: StudyMode,
}

impl StudySession {
    pub fn new(reviewer_id: Uuid, mode: StudyMode) -> Self {
        Self { reviewer_id, style: None, mode }
    }

    pub fn with_style(mut self, style: StudyStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// A fresh study/rest timer when the session studies Pomodoro-style.
    pub fn timer(&self) -> Option<StudyTimer> {
        (self.style == Some(StudyStyle::Pomodoro)).then(StudyTimer::pomodoro)
    }
}

/// Walks through a reviewer's quiz questions while keeping score.
#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    current: usize,
    score: usize,
    selected: Option<String>,
}

impl QuizSession {
    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        Self { questions, current: 0, score: 0, selected: None }
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.current)
    }

    /// `(1-based position, total)`.
    pub fn progress(&self) -> (usize, usize) {
        if self.questions.is_empty() {
            (0, 0)
        } else {
            (self.current + 1, self.questions.len())
        }
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_answered(&self) -> bool {
        self.selected.is_some()
    }

    /// Records the pick for the current question and returns whether it was
    /// correct. Only the first pick on a question is scored.
    pub fn answer(&mut self, option: &str) -> bool {
        let Some(question) = self.questions.get(self.current) else {
            return false;
        };
        let correct = question.answer == option;
        if self.selected.is_none() {
            if correct {
                self.score += 1;
            }
            self.selected = Some(option.to_string());
        }
        correct
    }

    /// Moves forward; `false` at the last question.
    pub fn next_question(&mut self) -> bool {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
            self.selected = None;
            true
        } else {
            false
        }
    }

    /// Moves back; `false` at the first question.
    pub fn previous_question(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            self.selected = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn question(text: &str, answer: &str) -> QuizQuestion {
        QuizQuestion {
            id: Uuid::new_v4(),
            question: text.to_string(),
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            answer: answer.to_string(),
            reviewer_id: Uuid::nil(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn scores_first_pick_only() {
        let mut quiz = QuizSession::new(vec![question("Q1", "b"), question("Q2", "c")]);
        assert_eq!(quiz.progress(), (1, 2));
        assert!(!quiz.answer("a"));
        assert!(quiz.answer("b"));
        assert_eq!(quiz.score(), 0);
        assert_eq!(quiz.selected(), Some("a"));

        assert!(quiz.next_question());
        assert!(!quiz.is_answered());
        assert!(quiz.answer("c"));
        assert_eq!(quiz.score(), 1);
        assert!(!quiz.next_question());
        assert_eq!(quiz.progress(), (2, 2));
    }

    #[test]
    fn navigation_is_bounded_and_clears_selection() {
        let mut quiz = QuizSession::new(vec![question("Q1", "a"), question("Q2", "a")]);
        assert!(!quiz.previous_question());
        quiz.answer("a");
        assert!(quiz.next_question());
        assert!(quiz.previous_question());
        assert_eq!(quiz.selected(), None);
        assert_eq!(quiz.current_question().map(|q| q.question.as_str()), Some("Q1"));
    }

    #[test]
    fn empty_quiz_is_inert() {
        let mut quiz = QuizSession::new(Vec::new());
        assert!(quiz.is_empty());
        assert_eq!(quiz.progress(), (0, 0));
        assert!(!quiz.answer("a"));
        assert!(!quiz.next_question());
        assert!(quiz.current_question().is_none());
    }

    #[test]
    fn study_session_carries_style_explicitly() {
        let id = Uuid::new_v4();
        let session = StudySession::new(id, StudyMode::Quiz).with_style(StudyStyle::Pomodoro);
        assert_eq!(session.reviewer_id, id);
        assert_eq!(session.style, Some(StudyStyle::Pomodoro));
        assert!(session.timer().is_some());
        let candle = StudySession::new(id, StudyMode::Summary).with_style(StudyStyle::Candle);
        assert!(candle.timer().is_none());
    }
}
