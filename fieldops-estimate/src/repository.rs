use async_trait::async_trait;
use fieldops_core::CoreResult;
use fieldops_order::Order;
use uuid::Uuid;

use crate::models::{Estimate, EstimateScope};

/// Estimate-with-items persistence, version-guarded like orders.
#[async_trait]
pub trait EstimateRepository: Send + Sync {
    async fn insert_estimate(&self, estimate: &Estimate) -> CoreResult<()>;

    async fn get_estimate(&self, id: Uuid) -> CoreResult<Option<Estimate>>;

    async fn list_estimates(&self, scope: &EstimateScope) -> CoreResult<Vec<Estimate>>;

    /// Write scalar fields and replace the items. Returns the estimate with
    /// its bumped version, or Conflict if the stored version moved.
    async fn update_estimate(&self, estimate: &Estimate) -> CoreResult<Estimate>;

    async fn delete_estimate(&self, id: Uuid) -> CoreResult<()>;

    /// In one transaction: store `estimate` (already marked converted) under
    /// the version guard and insert `order` with its items.
    async fn convert_estimate(&self, estimate: &Estimate, order: &Order) -> CoreResult<Estimate>;
}
