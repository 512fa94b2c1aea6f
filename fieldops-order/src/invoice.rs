use chrono::{DateTime, Utc};
use fieldops_core::access::{authorize, Operation};
use fieldops_core::money::{checked_sum, line_total};
use fieldops_core::{Actor, CoreError, CoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::{InvoiceRepository, OrderRepository};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(InvoiceStatus::Unpaid),
            "paid" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }
}

/// Bill raised against an order. Items are copied in at creation and never
/// follow later changes to the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub status: InvoiceStatus,
    pub items: Vec<InvoiceItem>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItemInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub order_id: Uuid,
    pub amount: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<InvoiceItemInput>,
}

/// Admin correction of an invoice. Absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoicePatch {
    pub amount: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub items: Option<Vec<InvoiceItemInput>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InvoiceSummary {
    pub total_invoices: usize,
    pub total_amount: Decimal,
    pub paid_invoices: usize,
    pub paid_amount: Decimal,
    pub unpaid_invoices: usize,
    pub outstanding_amount: Decimal,
}

impl InvoiceSummary {
    pub fn from_invoices(invoices: &[Invoice]) -> CoreResult<Self> {
        let (paid, unpaid): (Vec<&Invoice>, Vec<&Invoice>) =
            invoices.iter().partition(|i| i.status == InvoiceStatus::Paid);

        Ok(InvoiceSummary {
            total_invoices: invoices.len(),
            total_amount: checked_sum(invoices.iter().map(|i| i.amount))?,
            paid_invoices: paid.len(),
            paid_amount: checked_sum(paid.iter().map(|i| i.amount))?,
            unpaid_invoices: unpaid.len(),
            outstanding_amount: checked_sum(unpaid.iter().map(|i| i.amount))?,
        })
    }
}

fn build_items(invoice_id: Uuid, inputs: Vec<InvoiceItemInput>) -> CoreResult<Vec<InvoiceItem>> {
    inputs
        .into_iter()
        .map(|input| {
            if input.quantity <= Decimal::ZERO {
                return Err(CoreError::Validation(format!(
                    "Quantity must be positive, got {}",
                    input.quantity
                )));
            }
            if input.unit_price < Decimal::ZERO {
                return Err(CoreError::Validation("Unit price cannot be negative".to_string()));
            }
            Ok(InvoiceItem {
                id: Uuid::new_v4(),
                invoice_id,
                total: line_total(input.quantity, input.unit_price)?,
                description: input.description,
                quantity: input.quantity,
                unit_price: input.unit_price,
            })
        })
        .collect()
}

fn non_negative(name: &str, value: Decimal) -> CoreResult<()> {
    if value < Decimal::ZERO {
        return Err(CoreError::Validation(format!("{} cannot be negative", name)));
    }
    Ok(())
}

pub struct InvoiceService {
    invoices: Arc<dyn InvoiceRepository>,
    orders: Arc<dyn OrderRepository>,
}

impl InvoiceService {
    pub fn new(invoices: Arc<dyn InvoiceRepository>, orders: Arc<dyn OrderRepository>) -> Self {
        Self { invoices, orders }
    }

    /// Raise an invoice for an order. The client reference is taken from
    /// the order; clients may only bill their own orders.
    pub async fn create(&self, actor: &Actor, input: NewInvoice) -> CoreResult<Invoice> {
        authorize(actor, Operation::CreateInvoice)?;

        let order = self
            .orders
            .get_order(input.order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", input.order_id))?;

        if !actor.is_admin() && order.client_id != actor.user_id {
            return Err(CoreError::Forbidden(
                "You do not have permission to create an invoice for this order".to_string(),
            ));
        }

        non_negative("Amount", input.amount)?;
        non_negative("Tax", input.tax)?;
        non_negative("Discount", input.discount)?;

        let id = Uuid::new_v4();
        let invoice = Invoice {
            id,
            order_id: order.id,
            client_id: order.client_id,
            amount: input.amount,
            tax: input.tax,
            discount: input.discount,
            due_date: input.due_date,
            notes: input.notes,
            status: InvoiceStatus::Unpaid,
            items: build_items(id, input.items)?,
            version: 0,
            created_at: Utc::now(),
        };

        self.invoices.insert_invoice(&invoice).await?;
        tracing::info!("Invoice {} raised for order {} ({})", invoice.id, order.id, invoice.amount);
        Ok(invoice)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> CoreResult<Invoice> {
        authorize(actor, Operation::ViewInvoice)?;
        let invoice = self.load(id).await?;
        if !actor.is_admin() && invoice.client_id != actor.user_id {
            return Err(CoreError::Forbidden(
                "You do not have access to this invoice".to_string(),
            ));
        }
        Ok(invoice)
    }

    pub async fn list(&self, actor: &Actor) -> CoreResult<Vec<Invoice>> {
        authorize(actor, Operation::ListInvoices)?;
        let scope = if actor.is_admin() { None } else { Some(actor.user_id) };
        self.invoices.list_invoices(scope).await
    }

    /// Partial admin correction, including marking an invoice paid by hand.
    pub async fn update(&self, actor: &Actor, id: Uuid, patch: InvoicePatch) -> CoreResult<Invoice> {
        authorize(actor, Operation::UpdateInvoice)?;
        let mut invoice = self.load(id).await?;

        if let Some(amount) = patch.amount {
            non_negative("Amount", amount)?;
            invoice.amount = amount;
        }
        if let Some(tax) = patch.tax {
            non_negative("Tax", tax)?;
            invoice.tax = tax;
        }
        if let Some(discount) = patch.discount {
            non_negative("Discount", discount)?;
            invoice.discount = discount;
        }
        if let Some(due_date) = patch.due_date {
            invoice.due_date = Some(due_date);
        }
        if let Some(notes) = patch.notes {
            invoice.notes = Some(notes);
        }
        if let Some(status) = patch.status {
            invoice.status = InvoiceStatus::parse(&status).ok_or_else(|| {
                CoreError::Validation(format!("Invoice status must be 'unpaid' or 'paid', got '{}'", status))
            })?;
        }
        if let Some(items) = patch.items {
            invoice.items = build_items(invoice.id, items)?;
        }

        let saved = self.invoices.update_invoice(&invoice).await?;
        tracing::info!("Invoice {} corrected by {}", saved.id, actor.user_id);
        Ok(saved)
    }

    pub async fn summary(&self, actor: &Actor) -> CoreResult<InvoiceSummary> {
        authorize(actor, Operation::InvoiceSummary)?;
        let invoices = self.invoices.list_invoices(None).await?;
        InvoiceSummary::from_invoices(&invoices)
    }

    async fn load(&self, id: Uuid) -> CoreResult<Invoice> {
        self.invoices
            .get_invoice(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", id))
    }
}
