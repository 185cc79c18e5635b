//! Content selector.
//!
//! # Responsibility
//! - Split a total item count into fact/question targets by ratio.
//! - Pull the freshest undelivered candidates of each type from the pool.
//!
//! # Invariants
//! - `facts + questions == total` for every plan.
//! - With `total > 1` and both ratios strictly between 0 and 100, both
//!   targets are at least one.
//! - A shortfall is returned as-is; it is never an error here.

use crate::model::account::UserId;
use crate::model::content::{ContentItem, ContentType, ExamType};
use crate::model::preferences::ContentRatio;
use crate::repo::content_repo::{ContentPool, ContentQuery};
use crate::repo::RepoResult;
use chrono::NaiveDate;
use serde::Serialize;

/// Fact/question targets for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionPlan {
    pub total: u32,
    pub facts: u32,
    pub questions: u32,
}

impl SelectionPlan {
    /// Splits `total` by ratio, flooring the fact share.
    ///
    /// A type rounded down to zero borrows one item from the other type when
    /// its own share is non-zero. Questions are checked first.
    pub fn from_ratio(total: u32, ratio: ContentRatio) -> Self {
        let mut facts =
            u32::try_from(u64::from(total) * u64::from(ratio.fact_percent) / 100).unwrap_or(total);
        let mut questions = total - facts;

        if total > 0 {
            if questions == 0 && ratio.fact_percent < 100 {
                questions = 1;
                facts = total - 1;
            } else if facts == 0 && ratio.question_percent < 100 {
                facts = 1;
                questions = total - 1;
            }
        }

        Self {
            total,
            facts,
            questions,
        }
    }
}

/// Candidates split by type, each newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub facts: Vec<ContentItem>,
    pub questions: Vec<ContentItem>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.facts.len() + self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.questions.is_empty()
    }

    /// Facts first, then questions.
    pub fn into_ordered(self) -> impl Iterator<Item = ContentItem> {
        self.facts.into_iter().chain(self.questions)
    }
}

/// Input for one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub user_id: UserId,
    pub exam_types: Vec<ExamType>,
    pub plan: SelectionPlan,
    /// Restricts candidates to items still valid on this civil day.
    pub valid_on: Option<NaiveDate>,
}

/// Selects undelivered content from a pool.
pub struct ContentSelector<'a, P: ContentPool> {
    pool: &'a P,
}

impl<'a, P: ContentPool> ContentSelector<'a, P> {
    pub fn new(pool: &'a P) -> Self {
        Self { pool }
    }

    /// Returns up to the planned count of each type.
    ///
    /// # Errors
    /// - Any pool read failure, unchanged.
    pub fn select(&self, request: &SelectionRequest) -> RepoResult<Selection> {
        Ok(Selection {
            facts: self.select_type(request, ContentType::Fact, request.plan.facts)?,
            questions: self.select_type(request, ContentType::Question, request.plan.questions)?,
        })
    }

    fn select_type(
        &self,
        request: &SelectionRequest,
        content_type: ContentType,
        limit: u32,
    ) -> RepoResult<Vec<ContentItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.pool.select_newest(&ContentQuery {
            exam_types: request.exam_types.clone(),
            content_type,
            limit,
            exclude_delivered_to: Some(request.user_id),
            valid_on: request.valid_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SelectionPlan;
    use crate::model::preferences::ContentRatio;

    fn ratio(fact: u8) -> ContentRatio {
        ContentRatio::new(fact, 100 - fact).unwrap()
    }

    #[test]
    fn default_ratio_floors_fact_share() {
        let plan = SelectionPlan::from_ratio(21, ratio(85));
        assert_eq!((plan.facts, plan.questions), (17, 4));
    }

    #[test]
    fn starved_type_borrows_one_item() {
        let plan = SelectionPlan::from_ratio(4, ratio(5));
        assert_eq!((plan.facts, plan.questions), (1, 3));

        let plan = SelectionPlan::from_ratio(3, ratio(10));
        assert_eq!((plan.facts, plan.questions), (1, 2));
    }

    #[test]
    fn both_types_present_whenever_total_allows() {
        for fact in 1..100u8 {
            for total in 2..40u32 {
                let plan = SelectionPlan::from_ratio(total, ratio(fact));
                assert!(plan.facts >= 1 && plan.questions >= 1, "{fact}% of {total}");
                assert_eq!(plan.facts + plan.questions, total);
            }
        }
    }

    #[test]
    fn pure_ratios_and_tiny_totals() {
        assert_eq!(SelectionPlan::from_ratio(5, ratio(100)).questions, 0);
        assert_eq!(SelectionPlan::from_ratio(5, ratio(0)).facts, 0);
        assert_eq!(SelectionPlan::from_ratio(0, ratio(85)), SelectionPlan::default());

        let single = SelectionPlan::from_ratio(1, ratio(85));
        assert_eq!((single.facts, single.questions), (1, 0));
    }
}
