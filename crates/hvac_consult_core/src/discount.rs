//! crates/hvac_consult_core/src/discount.rs
//!
//! Photo-completion discounts. The totals stored on a consultation are a cache:
//! they are always recomputed in full from the image list and the registry.

use crate::domain::{Consultation, ConsultationImage, ImageCategory, PricingEstimate};
use crate::error::{ConsultError, ConsultResult, ValidationError};
use serde::{Deserialize, Serialize};

/// Upload progress for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgress {
    pub category: String,
    pub display_name: String,
    pub uploaded: usize,
    pub required: usize,
    pub completed: bool,
    pub discount_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountSummary {
    pub total_discount: i64,
    pub completed_categories: Vec<String>,
    pub categories: Vec<CategoryProgress>,
}

/// Counts uploads per registry category and totals the discounts of the
/// categories whose sub-categories are all covered. A category that declares
/// no sub-categories can never be completed.
pub fn summarize(registry: &[ImageCategory], images: &[ConsultationImage]) -> DiscountSummary {
    let categories: Vec<CategoryProgress> = registry
        .iter()
        .map(|cat| {
            let uploaded = images
                .iter()
                .filter(|img| img.category == cat.category)
                .count();
            let required = cat.sub_categories.len();
            CategoryProgress {
                category: cat.category.clone(),
                display_name: cat.display_name.clone(),
                uploaded,
                required,
                completed: required > 0 && uploaded >= required,
                discount_amount: cat.discount_amount,
            }
        })
        .collect();

    let completed: Vec<&CategoryProgress> = categories.iter().filter(|p| p.completed).collect();
    DiscountSummary {
        total_discount: completed
            .iter()
            .fold(0i64, |total, p| total.saturating_add(p.discount_amount)),
        completed_categories: completed.iter().map(|p| p.category.clone()).collect(),
        categories,
    }
}

/// Refreshes the cached discount fields of a consultation.
pub fn recompute(consultation: &mut Consultation, registry: &[ImageCategory]) -> DiscountSummary {
    let summary = summarize(registry, &consultation.images);
    consultation.total_discount = summary.total_discount;
    consultation.completed_categories = summary.completed_categories.clone();
    summary
}

/// Controls the zero-discount case of [`apply_once`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscountPolicy {
    /// When set, a call with no discount earned still consumes the one-time
    /// application. Otherwise it is a no-op and a later call may apply a
    /// discount earned in the meantime.
    pub lock_on_zero: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountOutcome {
    pub applied: bool,
    pub discount: i64,
    pub estimate: PricingEstimate,
    pub original_estimate: Option<PricingEstimate>,
}

/// Every tier price reduced by `discount`, floored at zero.
pub fn discounted_estimate(estimate: &PricingEstimate, discount: i64) -> PricingEstimate {
    PricingEstimate {
        estimates: estimate.estimates.map_prices(|price| (price - discount).max(0)),
        note: Some(format!("Includes a ${} photo discount", discount)),
        ..estimate.clone()
    }
}

/// Applies the accumulated discount to the current estimate, at most once.
pub fn apply_once(
    consultation: &mut Consultation,
    policy: DiscountPolicy,
) -> ConsultResult<DiscountOutcome> {
    let current = consultation
        .pricing_estimate
        .clone()
        .ok_or(ValidationError::NoEstimate)?;
    if consultation.original_pricing_estimate.is_some() {
        return Err(ConsultError::Conflict(
            "Discount has already been applied to this consultation".to_string(),
        ));
    }

    let discount = consultation.total_discount;
    if discount == 0 {
        if policy.lock_on_zero {
            consultation.original_pricing_estimate = Some(current.clone());
        }
        return Ok(DiscountOutcome {
            applied: false,
            discount,
            original_estimate: consultation.original_pricing_estimate.clone(),
            estimate: current,
        });
    }

    let discounted = discounted_estimate(&current, discount);
    consultation.original_pricing_estimate = Some(current.clone());
    consultation.pricing_estimate = Some(discounted.clone());
    Ok(DiscountOutcome {
        applied: true,
        discount,
        estimate: discounted,
        original_estimate: Some(current),
    })
}
