use chrono::{DateTime, Utc};
use fieldops_catalog::Technician;
use fieldops_core::GeoPoint;
use serde::Serialize;

/// Winning candidate and how far it is from the job.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Match {
    pub technician: Technician,
    pub distance_km: f64,
}

/// Ranks technicians for a job: exact qualification, available by
/// `not_before`, nearest first, higher rating on equal distance.
///
/// Distances are compared at millimetre precision so that two technicians
/// at the same spot tie even when float noise differs.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoMatcher;

impl GeoMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn find_best(
        &self,
        job: GeoPoint,
        qualification: &str,
        not_before: DateTime<Utc>,
        candidates: &[Technician],
    ) -> Option<Match> {
        let best = self
            .rank(job, qualification, not_before, candidates)
            .into_iter()
            .next();

        match &best {
            Some(m) => tracing::debug!(
                "Matched technician {} at {:.3} km for '{}'",
                m.technician.id,
                m.distance_km,
                qualification
            ),
            None => tracing::debug!(
                "No technician for '{}' among {} candidates",
                qualification,
                candidates.len()
            ),
        }
        best
    }

    /// Every eligible candidate in ranking order.
    pub fn rank(
        &self,
        job: GeoPoint,
        qualification: &str,
        not_before: DateTime<Utc>,
        candidates: &[Technician],
    ) -> Vec<Match> {
        let mut eligible: Vec<Match> = candidates
            .iter()
            .filter(|t| t.qualification == qualification && t.available_from <= not_before)
            .map(|t| Match {
                distance_km: job.distance_km(&t.location),
                technician: t.clone(),
            })
            .collect();

        eligible.sort_by(|a, b| {
            distance_key(a.distance_km)
                .cmp(&distance_key(b.distance_km))
                .then_with(|| b.technician.rating.total_cmp(&a.technician.rating))
        });
        eligible
    }
}

fn distance_key(km: f64) -> i64 {
    (km * 1_000_000.0).round() as i64
}
