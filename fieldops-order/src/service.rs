use chrono::{DateTime, Utc};
use fieldops_catalog::{price_lines, CatalogRepository, LineRequest, TechnicianRepository};
use fieldops_core::access::{authorize, Operation};
use fieldops_core::{Actor, CoreError, CoreResult, GeoPoint, Notifier, Role, UserDirectory};
use fieldops_dispatch::GeoMatcher;
use fieldops_shared::models::events::{OrderAssignedEvent, OrderStatusChangedEvent};
use fieldops_shared::DomainEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::changes::{ChangeHandler, OrderPatch};
use crate::models::{ExecutionState, Order, OrderFilter};
use crate::repository::OrderRepository;
use crate::workflow::{self, OrderError};

/// Order placed by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub qualification: String,
    #[serde(default)]
    pub description: Option<String>,
    pub address: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub preferred_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<LineRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub order: Order,
    pub technician_id: Uuid,
    /// Set when the matcher picked the technician.
    pub distance_km: Option<f64>,
}

/// Admin, dispatcher, the assigned technician and the owning client may
/// see an order.
pub fn can_view_order(actor: &Actor, order: &Order) -> bool {
    match actor.role {
        Role::Admin | Role::Dispatcher => true,
        Role::Technician => order.technician_id == Some(actor.user_id),
        Role::Client => order.client_id == actor.user_id,
    }
}

/// Admins act on any order; everyone else only on orders they placed.
pub fn ensure_order_owner(actor: &Actor, order: &Order) -> CoreResult<()> {
    if actor.is_admin() || order.client_id == actor.user_id {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ))
    }
}

fn ensure_field_access(actor: &Actor, order: &Order) -> CoreResult<()> {
    if actor.is_admin() || (actor.is(Role::Technician) && order.technician_id == Some(actor.user_id)) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "You do not have permission to update this order".to_string(),
        ))
    }
}

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogRepository>,
    technicians: Arc<dyn TechnicianRepository>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    matcher: GeoMatcher,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn CatalogRepository>,
        technicians: Arc<dyn TechnicianRepository>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            catalog,
            technicians,
            users,
            notifier,
            matcher: GeoMatcher::new(),
        }
    }

    pub async fn create(&self, actor: &Actor, input: NewOrder) -> CoreResult<Order> {
        authorize(actor, Operation::CreateOrder)?;

        if input.qualification.trim().is_empty() {
            return Err(CoreError::Validation("Qualification is required".to_string()));
        }
        if let Some(location) = &input.location {
            location.validate()?;
        }

        let lines = price_lines(self.catalog.as_ref(), &input.items).await?;

        let mut order = Order::new(actor.user_id, input.qualification, input.address);
        order.description = input.description;
        order.location = input.location;
        order.preferred_start_time = input.preferred_start_time;
        order.scheduled_start_time = input.scheduled_start_time;
        order.scheduled_end_time = input.scheduled_end_time;
        order.notes = input.notes;
        for line in lines {
            order.add_line(line);
        }
        if !order.items.is_empty() {
            order.total_cost = Some(order.items_total()?);
        }

        self.orders.insert_order(&order).await?;
        tracing::info!("Order {} placed by client {}", order.id, order.client_id);
        Ok(order)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> CoreResult<Order> {
        authorize(actor, Operation::ViewOrder)?;
        let order = self.load(id).await?;
        if !can_view_order(actor, &order) {
            return Err(CoreError::Forbidden(
                "You do not have permission to view this order".to_string(),
            ));
        }
        Ok(order)
    }

    pub async fn list(&self, actor: &Actor, status: Option<&str>) -> CoreResult<Vec<Order>> {
        authorize(actor, Operation::ListOrders)?;

        let mut filter = OrderFilter::default();
        if let Some(s) = status {
            filter.execution =
                Some(ExecutionState::parse(s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))?);
        }
        match actor.role {
            Role::Admin | Role::Dispatcher => {}
            Role::Technician => filter.technician_id = Some(actor.user_id),
            Role::Client => filter.client_id = Some(actor.user_id),
        }
        self.orders.list_orders(&filter).await
    }

    /// Assign a technician. With `technician_id` the choice is validated
    /// against the user registry; without it the matcher picks the nearest
    /// qualified technician available by the preferred start.
    pub async fn assign(
        &self,
        actor: &Actor,
        id: Uuid,
        technician_id: Option<Uuid>,
    ) -> CoreResult<Assignment> {
        authorize(actor, Operation::AssignTechnician)?;
        let mut order = self.load(id).await?;

        let (technician_id, distance_km) = match technician_id {
            Some(tid) => {
                self.users.require_role(tid, Role::Technician).await?;
                (tid, None)
            }
            None => {
                let best = self.match_technician(&order).await?;
                (best.technician.id, Some(best.distance_km))
            }
        };

        workflow::assign(&mut order, technician_id)?;
        let order = self.orders.update_order(&order).await?;

        tracing::info!(
            "Order {} assigned to technician {}{}",
            order.id,
            technician_id,
            distance_km.map(|d| format!(" ({:.2} km)", d)).unwrap_or_default()
        );
        self.notifier
            .notify(&DomainEvent::OrderAssigned(OrderAssignedEvent {
                order_id: order.id,
                technician_id,
                matched: distance_km.is_some(),
                distance_km,
                timestamp: Utc::now().timestamp(),
            }))
            .await;

        Ok(Assignment {
            order,
            technician_id,
            distance_km,
        })
    }

    async fn match_technician(&self, order: &Order) -> CoreResult<fieldops_dispatch::Match> {
        let location = order.location.ok_or_else(|| {
            CoreError::Validation(
                "Order has no location; choose a technician explicitly".to_string(),
            )
        })?;
        let not_before = order
            .preferred_start_time
            .or(order.scheduled_start_time)
            .unwrap_or_else(Utc::now);

        let candidates = self.technicians.candidates(&order.qualification).await?;
        self.matcher
            .find_best(location, &order.qualification, not_before, &candidates)
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "No available technician with qualification '{}'",
                    order.qualification
                ))
            })
    }

    /// `in_progress` / `completed` by an admin or the assigned technician.
    pub async fn update_status(&self, actor: &Actor, id: Uuid, update: StatusUpdate) -> CoreResult<Order> {
        authorize(actor, Operation::UpdateOrderStatus)?;
        let mut order = self.load(id).await?;
        ensure_field_access(actor, &order)?;

        let target = ExecutionState::parse(&update.status)
            .ok_or_else(|| OrderError::UnknownStatus(update.status.clone()))?;
        let stamp = match target {
            ExecutionState::Completed => update.actual_end_time,
            _ => update.actual_start_time,
        };

        let from = order.status.execution;
        workflow::transition(&mut order, target, stamp)?;
        let order = self.orders.update_order(&order).await?;

        self.status_changed(&order, from).await;
        Ok(order)
    }

    /// Field-restricted partial update.
    pub async fn update(&self, actor: &Actor, id: Uuid, patch: OrderPatch) -> CoreResult<Order> {
        authorize(actor, Operation::UpdateOrder)?;
        let mut order = self.load(id).await?;
        ensure_field_access(actor, &order)?;

        let change = ChangeHandler::apply(&mut order, patch, actor.role)?;
        let order = self.orders.update_order(&order).await?;

        if let Some((from, _)) = change {
            self.status_changed(&order, from).await;
        }
        Ok(order)
    }

    pub async fn cancel(&self, actor: &Actor, id: Uuid) -> CoreResult<Order> {
        authorize(actor, Operation::CancelOrder)?;
        let mut order = self.load(id).await?;
        if order.client_id != actor.user_id {
            return Err(CoreError::Forbidden("You cannot cancel this order".to_string()));
        }

        let from = order.status.execution;
        workflow::cancel(&mut order)?;
        let order = self.orders.update_order(&order).await?;

        tracing::info!("Order {} cancelled by client {}", order.id, actor.user_id);
        self.notifier
            .notify(&DomainEvent::OrderCancelled(OrderStatusChangedEvent {
                order_id: order.id,
                client_id: order.client_id,
                from: from.to_string(),
                to: order.status.execution.to_string(),
                timestamp: Utc::now().timestamp(),
            }))
            .await;
        Ok(order)
    }

    async fn status_changed(&self, order: &Order, from: ExecutionState) {
        tracing::info!("Order {} moved {} -> {}", order.id, from, order.status.execution);
        self.notifier
            .notify(&DomainEvent::OrderStatusChanged(OrderStatusChangedEvent {
                order_id: order.id,
                client_id: order.client_id,
                from: from.to_string(),
                to: order.status.execution.to_string(),
                timestamp: Utc::now().timestamp(),
            }))
            .await;
    }

    async fn load(&self, id: Uuid) -> CoreResult<Order> {
        self.orders
            .get_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", id))
    }
}
