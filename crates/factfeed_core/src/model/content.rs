//! Content pool item model.
//!
//! # Responsibility
//! - Define the read-only fact/question record the scheduler hands out.
//! - Validate type-specific fields (question options and answer).
//!
//! # Invariants
//! - `id` is stable and never reused for another item.
//! - Question items carry at least two options and a correct answer.
//! - Fact items carry neither options nor a correct answer.
//! - `date_to` is never earlier than `date_from`.

use super::validation::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of a content item.
pub type ContentId = Uuid;

/// Kind of micro-content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Direct statement, no answer expected.
    Fact,
    /// Multiple-choice quiz question.
    Question,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Question => "question",
        }
    }
}

impl FromStr for ContentType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fact" => Ok(Self::Fact),
            "question" => Ok(Self::Question),
            _ => Err(ValidationError::UnknownContentType(value.to_string())),
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exam category a content item is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExamType {
    General,
    #[serde(rename = "UPSC")]
    Upsc,
    #[serde(rename = "SSC")]
    Ssc,
    Banking,
    Railway,
    Defence,
}

impl ExamType {
    pub const ALL: [ExamType; 6] = [
        Self::General,
        Self::Upsc,
        Self::Ssc,
        Self::Banking,
        Self::Railway,
        Self::Defence,
    ];

    /// Stable storage and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Upsc => "UPSC",
            Self::Ssc => "SSC",
            Self::Banking => "Banking",
            Self::Railway => "Railway",
            Self::Defence => "Defence",
        }
    }
}

impl FromStr for ExamType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|exam| exam.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::UnknownExamType(value.to_string()))
    }
}

impl Display for ExamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fact or question from the content pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub content_type: ContentType,
    pub exam_type: ExamType,
    pub title: String,
    pub description: String,
    pub explanation: Option<String>,
    /// Topical grouping such as "Polity" or "Economy".
    pub category: Option<String>,
    /// Answer choices. Empty for facts.
    #[serde(default)]
    pub options: Vec<String>,
    /// Option label of the right answer. Questions only.
    pub correct_answer: Option<String>,
    /// First civil date the item is relevant for.
    pub date_from: NaiveDate,
    /// Last civil date the item is relevant for.
    pub date_to: NaiveDate,
    /// Unix epoch milliseconds. Drives newest-first selection.
    pub created_at: i64,
}

impl ContentItem {
    /// Creates a fact item with a generated id.
    pub fn fact(
        exam_type: ExamType,
        title: impl Into<String>,
        description: impl Into<String>,
        date_from: NaiveDate,
        date_to: NaiveDate,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type: ContentType::Fact,
            exam_type,
            title: title.into(),
            description: description.into(),
            explanation: None,
            category: None,
            options: Vec::new(),
            correct_answer: None,
            date_from,
            date_to,
            created_at,
        }
    }

    /// Creates a question item with a generated id.
    #[allow(clippy::too_many_arguments)]
    pub fn question(
        exam_type: ExamType,
        title: impl Into<String>,
        description: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        date_from: NaiveDate,
        date_to: NaiveDate,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type: ContentType::Question,
            exam_type,
            title: title.into(),
            description: description.into(),
            explanation: None,
            category: None,
            options,
            correct_answer: Some(correct_answer.into()),
            date_from,
            date_to,
            created_at,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Returns whether the validity window still covers `day`.
    pub fn is_valid_on(&self, day: NaiveDate) -> bool {
        self.date_from <= day && day <= self.date_to
    }

    /// Validates type-specific invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::InvalidContent(format!(
                "{} has a blank title",
                self.id
            )));
        }
        if self.date_to < self.date_from {
            return Err(ValidationError::InvalidContent(format!(
                "{} has date_to {} before date_from {}",
                self.id, self.date_to, self.date_from
            )));
        }
        match self.content_type {
            ContentType::Fact => {
                if !self.options.is_empty() || self.correct_answer.is_some() {
                    return Err(ValidationError::InvalidContent(format!(
                        "fact {} must not carry options or an answer",
                        self.id
                    )));
                }
            }
            ContentType::Question => {
                if self.options.len() < 2 {
                    return Err(ValidationError::InvalidContent(format!(
                        "question {} needs at least two options",
                        self.id
                    )));
                }
                let answered = self
                    .correct_answer
                    .as_deref()
                    .is_some_and(|answer| !answer.trim().is_empty());
                if !answered {
                    return Err(ValidationError::InvalidContent(format!(
                        "question {} has no correct answer",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentItem, ContentType, ExamType};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).expect("valid date")
    }

    #[test]
    fn exam_type_parses_case_insensitively_and_serializes_wire_name() {
        assert_eq!("upsc".parse::<ExamType>().unwrap(), ExamType::Upsc);
        assert_eq!(" Banking ".parse::<ExamType>().unwrap(), ExamType::Banking);
        assert!("GRE".parse::<ExamType>().is_err());
        assert_eq!(serde_json::to_string(&ExamType::Ssc).unwrap(), "\"SSC\"");
    }

    #[test]
    fn content_type_round_trips_through_str() {
        assert_eq!("Question".parse::<ContentType>().unwrap(), ContentType::Question);
        assert_eq!(ContentType::Fact.to_string(), "fact");
    }

    #[test]
    fn question_requires_options_and_answer() {
        let mut item = ContentItem::question(
            ExamType::Ssc,
            "Capital?",
            "Which city",
            vec!["A) Delhi".into(), "B) Pune".into()],
            "A",
            day(1),
            day(2),
            0,
        );
        assert!(item.validate().is_ok());

        item.options.truncate(1);
        assert!(item.validate().is_err());
    }

    #[test]
    fn fact_rejects_answer_and_reversed_window() {
        let mut item = ContentItem::fact(ExamType::General, "t", "d", day(1), day(2), 0);
        assert!(item.validate().is_ok());
        assert!(item.is_valid_on(day(2)));
        assert!(!item.is_valid_on(day(3)));

        item.correct_answer = Some("A".into());
        assert!(item.validate().is_err());

        let reversed = ContentItem::fact(ExamType::General, "t", "d", day(5), day(2), 0);
        assert!(reversed.validate().is_err());
    }
}
