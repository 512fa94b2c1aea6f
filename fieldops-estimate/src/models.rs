use chrono::{DateTime, Utc};
use fieldops_catalog::{ItemType, PricedLine};
use fieldops_core::money::{add_percent, checked_sum};
use fieldops_core::{CoreError, CoreResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Estimate status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
}

impl EstimateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateStatus::Draft => "draft",
            EstimateStatus::Sent => "sent",
            EstimateStatus::Approved => "approved",
            EstimateStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(EstimateStatus::Draft),
            "sent" => Some(EstimateStatus::Sent),
            "approved" => Some(EstimateStatus::Approved),
            "rejected" => Some(EstimateStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for EstimateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quote prepared for a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimate {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub items: Vec<EstimateItem>,
    pub discount: Decimal,
    /// Percent, applied after the discount.
    pub tax: Decimal,
    pub total: Decimal,
    pub status: EstimateStatus,
    pub description: Option<String>,
    pub payment_terms: Option<String>,
    pub service_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub job_number: Option<String>,
    pub converted_order_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Estimate {
    pub fn new(client_id: Uuid, technician_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            technician_id,
            items: Vec::new(),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            status: EstimateStatus::Draft,
            description: None,
            payment_terms: None,
            service_date: None,
            due_date: None,
            job_number: None,
            converted_order_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every line with freshly priced ones.
    pub fn replace_items(&mut self, lines: Vec<PricedLine>) {
        let id = self.id;
        self.items = lines.into_iter().map(|l| EstimateItem::from_line(id, l)).collect();
    }

    pub fn subtotal(&self) -> CoreResult<Decimal> {
        checked_sum(self.items.iter().map(|i| i.total))
    }

    pub fn recompute_total(&mut self, scale: u32) -> CoreResult<()> {
        self.total = compute_total(self.subtotal()?, self.discount, self.tax, scale)?;
        Ok(())
    }

    pub fn is_converted(&self) -> bool {
        self.converted_order_id.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// `(subtotal - discount)`, then plus `tax` percent of that, rounded half
/// away from zero and expressed with exactly `scale` decimal places.
pub fn compute_total(subtotal: Decimal, discount: Decimal, tax: Decimal, scale: u32) -> CoreResult<Decimal> {
    let net = subtotal
        .checked_sub(discount)
        .ok_or_else(|| CoreError::Validation("Discount is out of range".to_string()))?;
    let total = add_percent(net, tax)?;
    let mut total = total.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    total.rescale(scale);
    Ok(total)
}

/// An item within an estimate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimateItem {
    pub id: Uuid,
    pub estimate_id: Uuid,
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl EstimateItem {
    pub fn from_line(estimate_id: Uuid, line: PricedLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            estimate_id,
            item_type: line.item_type,
            item_id: line.item_id,
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price,
            total: line.total,
        }
    }
}

/// Who may appear in a listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateScope {
    pub client_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
}

impl EstimateScope {
    pub fn matches(&self, estimate: &Estimate) -> bool {
        self.client_id.map_or(true, |c| estimate.client_id == c)
            && self.technician_id.map_or(true, |t| estimate.technician_id == Some(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, unit_price: i64) -> PricedLine {
        PricedLine::new(
            ItemType::Service,
            Uuid::new_v4(),
            None,
            Decimal::from(quantity),
            Decimal::from(unit_price),
        )
        .unwrap()
    }

    #[test]
    fn test_total_with_discount_and_tax() {
        let mut estimate = Estimate::new(Uuid::new_v4(), None);
        estimate.replace_items(vec![line(2, 50), line(1, 100)]);
        estimate.discount = Decimal::from(20);
        estimate.tax = Decimal::from(10);
        estimate.recompute_total(2).unwrap();

        assert_eq!(estimate.subtotal().unwrap(), Decimal::from(200));
        assert_eq!(estimate.total, Decimal::new(19800, 2));
        assert_eq!(estimate.total.to_string(), "198.00");
    }

    #[test]
    fn test_total_rounds_to_scale() {
        // (10.00 - 0) * 1.0825 = 10.825
        let total = compute_total(Decimal::new(1000, 2), Decimal::ZERO, Decimal::new(825, 2), 2).unwrap();
        assert_eq!(total, Decimal::new(1083, 2));
    }

    #[test]
    fn test_no_tax_no_discount() {
        let total = compute_total(Decimal::from(75), Decimal::ZERO, Decimal::ZERO, 2).unwrap();
        assert_eq!(total, Decimal::from(75));
    }

    #[test]
    fn test_item_totals() {
        let mut estimate = Estimate::new(Uuid::new_v4(), None);
        estimate.replace_items(vec![line(3, 25)]);
        assert_eq!(estimate.items[0].total, Decimal::from(75));
        assert_eq!(estimate.items[0].estimate_id, estimate.id);
    }

    #[test]
    fn test_tax_overflow_is_rejected() {
        let err = compute_total(Decimal::MAX, Decimal::ZERO, Decimal::from(50), 2).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
