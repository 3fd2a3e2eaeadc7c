//! Quiz content as presented: up to four answer slots, one of them correct.

use content_directory::QuizPayload;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerSlot {
    A,
    B,
    C,
    D,
}

impl AnswerSlot {
    pub const ALL: [AnswerSlot; 4] = [AnswerSlot::A, AnswerSlot::B, AnswerSlot::C, AnswerSlot::D];

    pub fn letter(self) -> char {
        match self {
            AnswerSlot::A => 'A',
            AnswerSlot::B => 'B',
            AnswerSlot::C => 'C',
            AnswerSlot::D => 'D',
        }
    }

    /// Parse a single slot letter, case-insensitive.
    pub fn from_letter(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(AnswerSlot::A),
            "B" => Some(AnswerSlot::B),
            "C" => Some(AnswerSlot::C),
            "D" => Some(AnswerSlot::D),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AnswerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizDataError {
    #[error("quiz has no correct answer")]
    MissingCorrectAnswer,

    #[error("correct answer '{0}' does not match any non-empty answer")]
    UnmatchedCorrectAnswer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerVerdict {
    Correct,
    Incorrect,
}

impl fmt::Display for AnswerVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerVerdict::Correct => f.write_str("Correct!"),
            AnswerVerdict::Incorrect => f.write_str("Incorrect!"),
        }
    }
}

/// Answer slots with a designated correct slot that is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAnswerSet {
    slots: [Option<String>; 4],
    correct: AnswerSlot,
}

impl QuizAnswerSet {
    /// `correct_answer` may be the text of an answer or a slot letter.
    /// Text matches win over letters.
    pub fn new(slots: [Option<String>; 4], correct_answer: &str) -> Result<Self, QuizDataError> {
        let slots = slots.map(|slot| {
            slot.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        });

        let wanted = correct_answer.trim();
        if wanted.is_empty() {
            return Err(QuizDataError::MissingCorrectAnswer);
        }

        let by_text = AnswerSlot::ALL
            .into_iter()
            .find(|slot| slots[slot.index()].as_deref() == Some(wanted));
        let by_letter = || {
            AnswerSlot::from_letter(wanted).filter(|slot| slots[slot.index()].is_some())
        };

        match by_text.or_else(by_letter) {
            Some(correct) => Ok(Self { slots, correct }),
            None => Err(QuizDataError::UnmatchedCorrectAnswer(wanted.to_string())),
        }
    }

    pub fn answer(&self, slot: AnswerSlot) -> Option<&str> {
        self.slots[slot.index()].as_deref()
    }

    /// Non-empty answers only; empty slots are hidden.
    pub fn visible(&self) -> impl Iterator<Item = (AnswerSlot, &str)> + '_ {
        AnswerSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.answer(slot).map(|text| (slot, text)))
    }

    pub fn correct_slot(&self) -> AnswerSlot {
        self.correct
    }

    pub fn correct_text(&self) -> &str {
        self.answer(self.correct).unwrap_or_default()
    }

    pub fn check(&self, chosen: AnswerSlot) -> AnswerVerdict {
        if chosen == self.correct {
            AnswerVerdict::Correct
        } else {
            AnswerVerdict::Incorrect
        }
    }
}

/// A quiz ready to hand to the presenter.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizContent {
    pub id: Option<i64>,
    pub question: String,
    pub answers: QuizAnswerSet,
    pub explanation: Option<String>,
    /// Image URL or file id for the quiz icon.
    pub image_ref: Option<String>,
}

impl QuizContent {
    pub fn from_payload(payload: &QuizPayload) -> Result<Self, QuizDataError> {
        let answers = QuizAnswerSet::new(
            [
                payload.answer_a.clone(),
                payload.answer_b.clone(),
                payload.answer_c.clone(),
                payload.answer_d.clone(),
            ],
            payload.correct_answer.as_deref().unwrap_or_default(),
        )?;

        let question = payload.questions.clone().unwrap_or_default();
        if question.trim().is_empty() {
            tracing::warn!(quiz_id = ?payload.id, "Quiz has no question text");
        }

        Ok(Self {
            id: payload.id,
            question,
            answers,
            explanation: payload.explanation.clone().filter(|e| !e.trim().is_empty()),
            image_ref: payload.image.clone().filter(|i| !i.trim().is_empty()),
        })
    }
}
