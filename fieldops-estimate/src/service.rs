use chrono::{DateTime, Utc};
use fieldops_catalog::{price_lines, CatalogRepository, LineRequest};
use fieldops_core::access::{authorize, Operation};
use fieldops_core::{Actor, CoreError, CoreResult, GeoPoint, Notifier, Role, UserDirectory};
use fieldops_order::{Order, OrderItem};
use fieldops_shared::models::events::EstimateEvent;
use fieldops_shared::DomainEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Estimate, EstimateScope};
use crate::repository::EstimateRepository;
use crate::workflow;

/// Qualification used for converted orders when none is given.
pub const DEFAULT_QUALIFICATION: &str = "general";

/// Money rules applied to estimate totals.
#[derive(Debug, Clone, Copy)]
pub struct PricingRules {
    /// Decimal places kept on totals.
    pub money_scale: u32,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self { money_scale: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEstimate {
    pub client_id: Uuid,
    /// Only honoured for admins; technicians always own what they create.
    #[serde(default)]
    pub technician_id: Option<Uuid>,
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub service_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub job_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstimatePatch {
    pub items: Option<Vec<LineRequest>>,
    pub discount: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub description: Option<String>,
    pub payment_terms: Option<String>,
    pub service_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub job_number: Option<String>,
    /// Present only to give a clear error: status moves through send,
    /// approve and reject.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionOptions {
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub estimate: Estimate,
    pub order: Order,
}

fn validate_amounts(discount: Decimal, tax: Decimal) -> CoreResult<()> {
    if discount < Decimal::ZERO {
        return Err(CoreError::Validation("Discount cannot be negative".to_string()));
    }
    if tax < Decimal::ZERO {
        return Err(CoreError::Validation("Tax cannot be negative".to_string()));
    }
    Ok(())
}

fn ensure_discount_fits(estimate: &Estimate) -> CoreResult<()> {
    let subtotal = estimate.subtotal()?;
    if estimate.discount > subtotal {
        return Err(CoreError::Validation(format!(
            "Discount {} exceeds the item subtotal {}",
            estimate.discount, subtotal
        )));
    }
    Ok(())
}

fn can_view(actor: &Actor, estimate: &Estimate) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Technician => estimate.technician_id == Some(actor.user_id),
        Role::Client => estimate.client_id == actor.user_id,
        Role::Dispatcher => false,
    }
}

fn ensure_author(actor: &Actor, estimate: &Estimate) -> CoreResult<()> {
    if actor.is_admin() || (actor.is(Role::Technician) && estimate.technician_id == Some(actor.user_id)) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "You do not have access to this estimate".to_string(),
        ))
    }
}

fn ensure_recipient(actor: &Actor, estimate: &Estimate) -> CoreResult<()> {
    if estimate.client_id == actor.user_id {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "Only the client this estimate was prepared for can respond to it".to_string(),
        ))
    }
}

/// Build the order an approved estimate turns into.
pub fn order_from_estimate(estimate: &Estimate, options: ConversionOptions) -> Order {
    let qualification = options
        .qualification
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_QUALIFICATION.to_string());

    let mut order = Order::new(estimate.client_id, qualification, options.address.unwrap_or_default());
    order.technician_id = estimate.technician_id;
    order.location = options.location;
    order.description = estimate.description.clone();
    order.job_number = estimate.job_number.clone();
    order.preferred_start_time = estimate.service_date;
    order.total_cost = Some(estimate.total);
    let order_id = order.id;
    order.items = estimate
        .items
        .iter()
        .map(|item| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            item_type: item.item_type,
            item_id: item.item_id,
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total: item.total,
        })
        .collect();
    order
}

pub struct EstimateService {
    estimates: Arc<dyn EstimateRepository>,
    catalog: Arc<dyn CatalogRepository>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    rules: PricingRules,
}

impl EstimateService {
    pub fn new(
        estimates: Arc<dyn EstimateRepository>,
        catalog: Arc<dyn CatalogRepository>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        rules: PricingRules,
    ) -> Self {
        Self {
            estimates,
            catalog,
            users,
            notifier,
            rules,
        }
    }

    pub async fn create(&self, actor: &Actor, input: NewEstimate) -> CoreResult<Estimate> {
        authorize(actor, Operation::CreateEstimate)?;
        self.users.require_role(input.client_id, Role::Client).await?;

        let technician_id = if actor.is(Role::Technician) {
            Some(actor.user_id)
        } else {
            match input.technician_id {
                Some(tid) => Some(self.users.require_role(tid, Role::Technician).await?.id),
                None => None,
            }
        };

        validate_amounts(input.discount, input.tax)?;
        let lines = price_lines(self.catalog.as_ref(), &input.items).await?;

        let mut estimate = Estimate::new(input.client_id, technician_id);
        estimate.replace_items(lines);
        estimate.discount = input.discount;
        estimate.tax = input.tax;
        estimate.description = input.description;
        estimate.payment_terms = input.payment_terms;
        estimate.service_date = input.service_date;
        estimate.due_date = input.due_date;
        estimate.job_number = input.job_number;
        ensure_discount_fits(&estimate)?;
        estimate.recompute_total(self.rules.money_scale)?;

        self.estimates.insert_estimate(&estimate).await?;
        tracing::info!(
            "Estimate {} drafted for client {} (total {})",
            estimate.id,
            estimate.client_id,
            estimate.total
        );
        Ok(estimate)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> CoreResult<Estimate> {
        authorize(actor, Operation::ViewEstimate)?;
        let estimate = self.load(id).await?;
        if !can_view(actor, &estimate) {
            return Err(CoreError::Forbidden(
                "You do not have access to this estimate".to_string(),
            ));
        }
        Ok(estimate)
    }

    pub async fn list(&self, actor: &Actor) -> CoreResult<Vec<Estimate>> {
        authorize(actor, Operation::ListEstimates)?;
        let scope = match actor.role {
            Role::Technician => EstimateScope {
                technician_id: Some(actor.user_id),
                ..Default::default()
            },
            Role::Client => EstimateScope {
                client_id: Some(actor.user_id),
                ..Default::default()
            },
            _ => EstimateScope::default(),
        };
        self.estimates.list_estimates(&scope).await
    }

    /// Partial update of a draft. Replacing items re-prices them from the
    /// catalog; any change to items, discount or tax recomputes the total.
    pub async fn update(&self, actor: &Actor, id: Uuid, patch: EstimatePatch) -> CoreResult<Estimate> {
        authorize(actor, Operation::UpdateEstimate)?;
        let mut estimate = self.load(id).await?;
        ensure_author(actor, &estimate)?;

        if patch.status.is_some() {
            return Err(CoreError::Validation(
                "Estimate status changes through send, approve and reject".to_string(),
            ));
        }
        workflow::ensure_editable(&estimate)?;

        let recompute = patch.items.is_some() || patch.discount.is_some() || patch.tax.is_some();

        if let Some(lines) = patch.items {
            let priced = price_lines(self.catalog.as_ref(), &lines).await?;
            estimate.replace_items(priced);
        }
        if let Some(discount) = patch.discount {
            estimate.discount = discount;
        }
        if let Some(tax) = patch.tax {
            estimate.tax = tax;
        }
        validate_amounts(estimate.discount, estimate.tax)?;
        if let Some(v) = patch.description {
            estimate.description = Some(v);
        }
        if let Some(v) = patch.payment_terms {
            estimate.payment_terms = Some(v);
        }
        if let Some(v) = patch.service_date {
            estimate.service_date = Some(v);
        }
        if let Some(v) = patch.due_date {
            estimate.due_date = Some(v);
        }
        if let Some(v) = patch.job_number {
            estimate.job_number = Some(v);
        }
        if recompute {
            ensure_discount_fits(&estimate)?;
            estimate.recompute_total(self.rules.money_scale)?;
        }
        estimate.touch();

        self.estimates.update_estimate(&estimate).await
    }

    pub async fn send(&self, actor: &Actor, id: Uuid) -> CoreResult<Estimate> {
        authorize(actor, Operation::SendEstimate)?;
        let mut estimate = self.load(id).await?;
        ensure_author(actor, &estimate)?;

        workflow::send(&mut estimate)?;
        let estimate = self.estimates.update_estimate(&estimate).await?;

        tracing::info!("Estimate {} sent to client {}", estimate.id, estimate.client_id);
        self.notifier.notify(&DomainEvent::EstimateSent(event(&estimate))).await;
        Ok(estimate)
    }

    pub async fn approve(&self, actor: &Actor, id: Uuid) -> CoreResult<Estimate> {
        authorize(actor, Operation::ApproveEstimate)?;
        let mut estimate = self.load(id).await?;
        ensure_recipient(actor, &estimate)?;

        workflow::approve(&mut estimate)?;
        let estimate = self.estimates.update_estimate(&estimate).await?;

        tracing::info!("Estimate {} approved", estimate.id);
        self.notifier.notify(&DomainEvent::EstimateApproved(event(&estimate))).await;
        Ok(estimate)
    }

    pub async fn reject(&self, actor: &Actor, id: Uuid) -> CoreResult<Estimate> {
        authorize(actor, Operation::RejectEstimate)?;
        let mut estimate = self.load(id).await?;
        ensure_recipient(actor, &estimate)?;

        workflow::reject(&mut estimate)?;
        let estimate = self.estimates.update_estimate(&estimate).await?;

        tracing::info!("Estimate {} rejected", estimate.id);
        self.notifier.notify(&DomainEvent::EstimateRejected(event(&estimate))).await;
        Ok(estimate)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> CoreResult<()> {
        authorize(actor, Operation::DeleteEstimate)?;
        let estimate = self.load(id).await?;
        workflow::ensure_deletable(&estimate)?;
        self.estimates.delete_estimate(id).await?;
        tracing::info!("Estimate {} deleted by {}", id, actor.user_id);
        Ok(())
    }

    /// Turn an approved estimate into a pending order, once.
    pub async fn convert_to_order(
        &self,
        actor: &Actor,
        id: Uuid,
        options: ConversionOptions,
    ) -> CoreResult<Conversion> {
        authorize(actor, Operation::ConvertEstimate)?;
        let mut estimate = self.load(id).await?;
        workflow::ensure_convertible(&estimate)?;
        if let Some(location) = &options.location {
            location.validate()?;
        }

        let order = order_from_estimate(&estimate, options);
        estimate.converted_order_id = Some(order.id);
        estimate.touch();

        let estimate = self.estimates.convert_estimate(&estimate, &order).await?;
        tracing::info!("Estimate {} converted into order {}", estimate.id, order.id);
        Ok(Conversion { estimate, order })
    }

    async fn load(&self, id: Uuid) -> CoreResult<Estimate> {
        self.estimates
            .get_estimate(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Estimate", id))
    }
}

fn event(estimate: &Estimate) -> EstimateEvent {
    EstimateEvent {
        estimate_id: estimate.id,
        client_id: estimate.client_id,
        technician_id: estimate.technician_id,
        total: estimate.total,
        timestamp: Utc::now().timestamp(),
    }
}
