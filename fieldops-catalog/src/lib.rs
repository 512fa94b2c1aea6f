pub mod pricing;
pub mod product;
pub mod technician;

pub use pricing::{price_lines, subtotal, LineRequest, PricedLine};
pub use product::{CatalogEntry, CatalogError, CatalogRepository, ItemType};
pub use technician::{Technician, TechnicianRepository};
