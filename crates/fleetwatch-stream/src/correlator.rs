//! Open-alert correlation for raw probe lists.
//!
//! Only applied to non-aggregated frames (single vehicle or small extent);
//! aggregated grid summaries are never correlated, which bounds the number
//! of Alert Store calls per tick to one per raw-list client.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fleetwatch_types::{Alert, AlertSummary, ProbeSample};

use crate::error::StoreError;
use crate::store::AlertStore;

/// Upper bound on alerts requested per correlation.
pub const MAX_ALERT_LIMIT: u32 = 200;

/// Attaches open-alert summaries to probe samples.
#[derive(Clone)]
pub struct AlertCorrelator {
    store: Arc<dyn AlertStore>,
    limit: u32,
}

impl AlertCorrelator {
    /// Create a correlator; `limit` is capped at [`MAX_ALERT_LIMIT`].
    pub fn new(store: Arc<dyn AlertStore>, limit: u32) -> Self {
        Self {
            store,
            limit: limit.clamp(1, MAX_ALERT_LIMIT),
        }
    }

    /// Fetch open alerts for the vehicles in `probes` and attach a summary
    /// to `info.alerts` of every probe whose vehicle has at least one.
    ///
    /// Returns the number of probes decorated. An empty list makes no store
    /// call.
    ///
    /// # Errors
    ///
    /// Returns the store's error; `probes` is left untouched in that case.
    pub async fn correlate(&self, probes: &mut [ProbeSample]) -> Result<usize, StoreError> {
        if probes.is_empty() {
            return Ok(0);
        }

        let mo_ids: Vec<String> = probes
            .iter()
            .map(|p| p.mo_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let page = self
            .store
            .get_alerts_for_vehicles(&mo_ids, false, self.limit)
            .await?;

        let mut alerts: Vec<Alert> = page.alerts.into_iter().filter(Alert::is_open).collect();
        alerts.sort_by(|a, b| b.ts.cmp(&a.ts));

        let mut by_vehicle: BTreeMap<String, AlertSummary> = BTreeMap::new();
        for alert in alerts {
            by_vehicle
                .entry(alert.mo_id.clone())
                .or_default()
                .record(alert);
        }

        let mut decorated: usize = 0;
        for probe in probes.iter_mut() {
            if let Some(summary) = by_vehicle.get(&probe.mo_id) {
                probe.info.get_or_insert_with(Default::default).alerts = Some(summary.clone());
                decorated = decorated.saturating_add(1);
            }
        }
        Ok(decorated)
    }
}

impl core::fmt::Debug for AlertCorrelator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlertCorrelator")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
