//! crates/hvac_consult_core/src/pricing.rs
//!
//! Good-Better-Best price estimation: square footage drives a tonnage, the
//! tonnage selects a row of the price table, and homes with more than one
//! system get a flat multiplier.

use crate::domain::{AnswerValue, PricingEstimate, QuizAnswer, TierEstimate, TierEstimates};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

pub const MULTI_SYSTEM_MULTIPLIER: f64 = 1.85;
pub const DEFAULT_TONNAGE: f64 = 3.5;
pub const DEFAULT_SQUARE_FOOTAGE: &str = "1,500 - 2,200 sq ft";

pub const GOOD_LABEL: &str = "Budget-Focused";
pub const BETTER_LABEL: &str = "Efficiency & Value";
pub const BEST_LABEL: &str = "Ultimate Comfort";

/// Question-text fragments that identify the answers pricing depends on.
const SQUARE_FOOTAGE_HINT: &str = "square footage";
const SYSTEM_COUNT_HINT: &str = "how many separate systems";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
    pub min_price: i64,
    pub max_price: i64,
}

impl PriceRange {
    pub const fn new(min_price: i64, max_price: i64) -> Self {
        Self { min_price, max_price }
    }

    fn scaled(self, multiplier: f64) -> Self {
        // Truncation, not rounding.
        Self {
            min_price: (self.min_price as f64 * multiplier) as i64,
            max_price: (self.max_price as f64 * multiplier) as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierPricing {
    pub good: PriceRange,
    pub better: PriceRange,
    pub best: PriceRange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingRow {
    pub tonnage: f64,
    pub pricing: TierPricing,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("pricing table is empty")]
    EmptyTable,
}

/// The tonnage to price-tier lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    rows: Vec<PricingRow>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PricingTable {
    pub fn new(rows: Vec<PricingRow>) -> Self {
        Self { rows }
    }

    /// The four-row table the service ships with.
    pub fn standard() -> Self {
        let row = |tonnage, good, better, best| PricingRow {
            tonnage,
            pricing: TierPricing { good, better, best },
        };
        Self::new(vec![
            row(
                2.5,
                PriceRange::new(8500, 10500),
                PriceRange::new(11000, 13000),
                PriceRange::new(14000, 16500),
            ),
            row(
                3.5,
                PriceRange::new(9500, 11500),
                PriceRange::new(13500, 15500),
                PriceRange::new(17000, 19500),
            ),
            row(
                4.0,
                PriceRange::new(10500, 12500),
                PriceRange::new(14500, 16500),
                PriceRange::new(18000, 21000),
            ),
            row(
                5.0,
                PriceRange::new(11500, 14000),
                PriceRange::new(15500, 18000),
                PriceRange::new(19500, 23000),
            ),
        ])
    }

    /// Exact tonnage match, else the nearest row. Ties go to the earlier row.
    pub fn pricing_for_tonnage(&self, tonnage: f64) -> Result<TierPricing, PricingError> {
        if let Some(row) = self.rows.iter().find(|row| row.tonnage == tonnage) {
            return Ok(row.pricing);
        }
        let mut nearest: Option<&PricingRow> = None;
        for row in &self.rows {
            let closer = match nearest {
                None => true,
                Some(best) => (row.tonnage - tonnage).abs() < (best.tonnage - tonnage).abs(),
            };
            if closer {
                nearest = Some(row);
            }
        }
        nearest.map(|row| row.pricing).ok_or(PricingError::EmptyTable)
    }

    pub fn calculate_estimate(
        &self,
        square_footage: &str,
        system_count: u32,
    ) -> Result<PricingEstimate, PricingError> {
        let tonnage = determine_tonnage(square_footage);
        let base = self.pricing_for_tonnage(tonnage)?;
        let pricing = apply_multi_system_multiplier(base, system_count);

        let tier = |label: &str, range: PriceRange| TierEstimate {
            label: label.to_string(),
            min_price: range.min_price,
            max_price: range.max_price,
        };
        Ok(PricingEstimate {
            estimates: TierEstimates {
                good: tier(GOOD_LABEL, pricing.good),
                better: tier(BETTER_LABEL, pricing.better),
                best: tier(BEST_LABEL, pricing.best),
            },
            tonnage,
            system_count,
            note: None,
            generated_at: Utc::now(),
        })
    }

    /// Builds an estimate from stored quiz answers. Never fails: any internal
    /// error degrades to [`fallback_estimate`].
    pub fn estimate_from_answers(&self, answers: &BTreeMap<Uuid, QuizAnswer>) -> PricingEstimate {
        let mut square_footage = None;
        let mut system_count_answer = None;
        for answer in answers.values() {
            let question = answer.question_text.to_lowercase();
            if question.contains(SQUARE_FOOTAGE_HINT) {
                square_footage = Some(&answer.answer);
            } else if question.contains(SYSTEM_COUNT_HINT) {
                system_count_answer = Some(&answer.answer);
            }
        }

        let square_footage = square_footage
            .map(AnswerValue::as_text)
            .unwrap_or_else(|| DEFAULT_SQUARE_FOOTAGE.to_string());
        let system_count = system_count_answer
            .map(|a| extract_system_count(&a.as_text()))
            .unwrap_or(1);

        match self.calculate_estimate(&square_footage, system_count) {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!("Pricing calculation failed, using fallback estimate: {}", e);
                fallback_estimate(format!("Pricing calculation error: {}", e))
            }
        }
    }
}

/// Maps a bucketed square-footage label to a tonnage. Unknown labels get 3.5.
pub fn determine_tonnage(square_footage: &str) -> f64 {
    let label = square_footage.to_lowercase();
    if label.contains("under 1,500") || label.contains("under 1500") {
        2.5
    } else if label.contains("1,500 - 2,200") || label.contains("1500-2200") {
        3.5
    } else if label.contains("2,200 - 3,000") || label.contains("2200-3000") {
        4.0
    } else if label.contains("over 3,000") || label.contains("over 3000") {
        5.0
    } else {
        DEFAULT_TONNAGE
    }
}

/// Scales every tier by [`MULTI_SYSTEM_MULTIPLIER`] when there are two or more systems.
pub fn apply_multi_system_multiplier(pricing: TierPricing, system_count: u32) -> TierPricing {
    if system_count < 2 {
        return pricing;
    }
    TierPricing {
        good: pricing.good.scaled(MULTI_SYSTEM_MULTIPLIER),
        better: pricing.better.scaled(MULTI_SYSTEM_MULTIPLIER),
        best: pricing.best.scaled(MULTI_SYSTEM_MULTIPLIER),
    }
}

/// Returns the first of the digits 1-4 found in the answer, checked in that
/// order. Anything else counts as a single system.
pub fn extract_system_count(answer: &str) -> u32 {
    ['1', '2', '3', '4']
        .iter()
        .find(|digit| answer.contains(**digit))
        .and_then(|digit| digit.to_digit(10))
        .unwrap_or(1)
}

/// The hardcoded estimate used when the calculation itself fails.
pub fn fallback_estimate(note: String) -> PricingEstimate {
    let tier = |label: &str, min_price, max_price| TierEstimate {
        label: label.to_string(),
        min_price,
        max_price,
    };
    PricingEstimate {
        estimates: TierEstimates {
            good: tier(GOOD_LABEL, 9500, 11500),
            better: tier(BETTER_LABEL, 13500, 15500),
            best: tier(BEST_LABEL, 17000, 19500),
        },
        tonnage: DEFAULT_TONNAGE,
        system_count: 1,
        note: Some(note),
        generated_at: Utc::now(),
    }
}
