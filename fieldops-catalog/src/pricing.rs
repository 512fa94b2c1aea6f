use fieldops_core::money::{checked_sum, line_total};
use fieldops_core::CoreResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::product::{CatalogError, CatalogRepository, ItemType};

/// A line as submitted by a caller: the unit price is never trusted from
/// input, it is resolved from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRequest {
    pub item_type: String,
    pub item_id: Uuid,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: Decimal,
}

/// A line with its price fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedLine {
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl PricedLine {
    pub fn new(
        item_type: ItemType,
        item_id: Uuid,
        description: Option<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> CoreResult<Self> {
        Ok(Self {
            item_type,
            item_id,
            description,
            quantity,
            unit_price,
            total: line_total(quantity, unit_price)?,
        })
    }
}

/// Resolve unit prices for every requested line. Fails on the first unknown
/// item type, missing catalog entry or non-positive quantity.
pub async fn price_lines(
    catalog: &dyn CatalogRepository,
    lines: &[LineRequest],
) -> CoreResult<Vec<PricedLine>> {
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let item_type: ItemType = line.item_type.parse()?;
        if line.quantity <= Decimal::ZERO {
            return Err(CatalogError::InvalidQuantity(line.quantity).into());
        }
        let entry = catalog
            .find_entry(item_type, line.item_id)
            .await?
            .ok_or(CatalogError::NotFound { item_type, id: line.item_id })?;

        priced.push(PricedLine::new(
            item_type,
            line.item_id,
            line.description.clone(),
            line.quantity,
            entry.price,
        )?);
    }
    Ok(priced)
}

/// Σ qty × unit_price
pub fn subtotal<'a>(lines: impl IntoIterator<Item = &'a PricedLine>) -> CoreResult<Decimal> {
    checked_sum(lines.into_iter().map(|l| l.total))
}
