use async_trait::async_trait;
use fieldops_core::{CoreError, CoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What a priced line refers to in the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Service,
    Material,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Service => "service",
            ItemType::Material => "material",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ItemType::Service => "Service",
            ItemType::Material => "Material",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(ItemType::Service),
            "material" => Ok(ItemType::Material),
            _ => Err(CatalogError::UnknownItemType(s.to_string())),
        }
    }
}

/// A priced service or material offered to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub item_type: ItemType,
    pub name: String,
    pub price: Decimal,
}

impl CatalogEntry {
    pub fn new(item_type: ItemType, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_type,
            name: name.into(),
            price,
        }
    }
}

/// Catalog lookup collaborator. Entries are maintained elsewhere; the
/// workflows only read prices.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_entry(&self, item_type: ItemType, id: Uuid) -> CoreResult<Option<CatalogEntry>>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{} with ID {id} not found", .item_type.label())]
    NotFound { item_type: ItemType, id: Uuid },

    #[error("Item type must be 'service' or 'material', got '{0}'")]
    UnknownItemType(String),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),
}

impl From<CatalogError> for CoreError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound { .. } => CoreError::NotFound(e.to_string()),
            CatalogError::UnknownItemType(_) | CatalogError::InvalidQuantity(_) => {
                CoreError::Validation(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_parsing() {
        assert_eq!("service".parse::<ItemType>().unwrap(), ItemType::Service);
        assert_eq!("material".parse::<ItemType>().unwrap(), ItemType::Material);
        let err: CoreError = "labour".parse::<ItemType>().unwrap_err().into();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_not_found_message_names_the_kind() {
        let id = Uuid::new_v4();
        let err = CatalogError::NotFound { item_type: ItemType::Material, id };
        assert_eq!(err.to_string(), format!("Material with ID {} not found", id));
    }
}
