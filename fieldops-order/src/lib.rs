pub mod changes;
pub mod invoice;
pub mod models;
pub mod payment;
pub mod reconciler;
pub mod repository;
pub mod service;
pub mod workflow;

pub use changes::{ChangeError, ChangeHandler, OrderPatch};
pub use invoice::{Invoice, InvoiceItem, InvoiceItemInput, InvoicePatch, InvoiceService, InvoiceStatus, InvoiceSummary, NewInvoice};
pub use models::{ExecutionState, Order, OrderFilter, OrderItem, OrderStatus, PaymentState};
pub use payment::{Payment, PaymentRecord, PaymentStatus};
pub use reconciler::{CaptureInput, PaymentReconciler, Reconciliation};
pub use repository::{InvoiceRepository, OrderRepository, PaymentRepository};
pub use service::{Assignment, NewOrder, OrderService, StatusUpdate};
pub use workflow::OrderError;
