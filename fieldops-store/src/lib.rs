pub mod app_config;
pub mod billing_repo;
pub mod catalog_repo;
pub mod database;
pub mod estimate_repo;
pub mod memory;
pub mod order_repo;

pub use billing_repo::StoreBillingRepository;
pub use catalog_repo::StoreDirectory;
pub use database::DbClient;
pub use estimate_repo::StoreEstimateRepository;
pub use memory::MemoryStore;
pub use order_repo::StoreOrderRepository;
