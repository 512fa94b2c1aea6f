use std::sync::Arc;
use std::time::Duration;

use fieldops_catalog::{CatalogRepository, TechnicianRepository};
use fieldops_core::payment::SandboxGateway;
use fieldops_core::{LogNotifier, Notifier, PaymentGateway, UserDirectory};
use fieldops_estimate::{EstimateRepository, EstimateService, PricingRules};
use fieldops_order::{
    InvoiceRepository, InvoiceService, OrderRepository, OrderService, PaymentReconciler, PaymentRepository,
};
use fieldops_store::app_config::{Config, WebhookConfig};
use fieldops_store::{
    DbClient, MemoryStore, StoreBillingRepository, StoreDirectory, StoreEstimateRepository, StoreOrderRepository,
};

use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Every persistence seam the services need.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserDirectory>,
    pub technicians: Arc<dyn TechnicianRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub estimates: Arc<dyn EstimateRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub payments: Arc<dyn PaymentRepository>,
}

impl Repositories {
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            technicians: store.clone(),
            catalog: store.clone(),
            estimates: store.clone(),
            orders: store.clone(),
            invoices: store.clone(),
            payments: store,
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        let directory = Arc::new(StoreDirectory::new(db.pool.clone()));
        let billing = Arc::new(StoreBillingRepository::new(db.pool.clone()));
        Self {
            users: directory.clone(),
            technicians: directory.clone(),
            catalog: directory,
            estimates: Arc::new(StoreEstimateRepository::new(db.pool.clone())),
            orders: Arc::new(StoreOrderRepository::new(db.pool.clone())),
            invoices: billing.clone(),
            payments: billing,
        }
    }
}

pub struct Resiliency {
    pub payment_cb: CircuitBreaker,
}

#[derive(Clone)]
pub struct AppState {
    pub estimates: Arc<EstimateService>,
    pub orders: Arc<OrderService>,
    pub invoices: Arc<InvoiceService>,
    pub payments: Arc<PaymentReconciler>,
    pub auth: AuthConfig,
    pub webhooks: WebhookConfig,
    pub resiliency: Arc<Resiliency>,
}

impl AppState {
    /// Wire services with the sandbox gateway and the logging notifier.
    pub fn new(repos: Repositories, config: &Config) -> Self {
        Self::with_collaborators(repos, config, Arc::new(SandboxGateway), Arc::new(LogNotifier))
    }

    pub fn with_collaborators(
        repos: Repositories,
        config: &Config,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let rules = PricingRules {
            money_scale: config.business_rules.money_scale,
        };

        Self {
            estimates: Arc::new(EstimateService::new(
                repos.estimates.clone(),
                repos.catalog.clone(),
                repos.users.clone(),
                notifier.clone(),
                rules,
            )),
            orders: Arc::new(OrderService::new(
                repos.orders.clone(),
                repos.catalog.clone(),
                repos.technicians.clone(),
                repos.users.clone(),
                notifier.clone(),
            )),
            invoices: Arc::new(InvoiceService::new(repos.invoices.clone(), repos.orders.clone())),
            payments: Arc::new(PaymentReconciler::new(
                repos.orders.clone(),
                repos.payments.clone(),
                gateway,
                notifier,
            )),
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
            },
            webhooks: config.webhooks.clone(),
            resiliency: Arc::new(Resiliency {
                payment_cb: CircuitBreaker::new(
                    "payment-gateway",
                    config.gateway.failure_threshold as usize,
                    Duration::from_secs(config.gateway.reset_timeout_seconds),
                ),
            }),
        }
    }
}
