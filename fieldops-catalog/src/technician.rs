use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldops_core::{CoreResult, GeoPoint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Technician profile as maintained by the profile collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Technician {
    pub id: Uuid,
    pub name: String,
    pub qualification: String,
    pub location: GeoPoint,
    /// Earliest time the technician can take a job.
    pub available_from: DateTime<Utc>,
    pub rating: f64,
}

#[async_trait]
pub trait TechnicianRepository: Send + Sync {
    /// Profiles carrying exactly this qualification tag. Read without locks.
    async fn candidates(&self, qualification: &str) -> CoreResult<Vec<Technician>>;
}
