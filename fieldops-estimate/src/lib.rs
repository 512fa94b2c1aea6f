pub mod models;
pub mod repository;
pub mod service;
pub mod workflow;

pub use models::{compute_total, Estimate, EstimateItem, EstimateScope, EstimateStatus};
pub use repository::EstimateRepository;
pub use service::{Conversion, ConversionOptions, EstimatePatch, EstimateService, NewEstimate, PricingRules};
pub use workflow::EstimateError;
