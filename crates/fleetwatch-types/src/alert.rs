//! Vehicle alerts and the per-vehicle summary attached to raw probes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Severity of a vehicle alert, as reported by the Alert Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertSeverity {
    /// Immediate attention required.
    Critical,
    /// Serious condition.
    High,
    /// Noticeable condition.
    Medium,
    /// Minor condition.
    Low,
    /// Informational only.
    Info,
}

impl AlertSeverity {
    /// Ranking used when picking the worst severity per alert type.
    ///
    /// Critical and High share the top tier, Medium and Low the middle one.
    pub const fn tier(self) -> u8 {
        match self {
            Self::Critical | Self::High => 2,
            Self::Medium | Self::Low => 1,
            Self::Info => 0,
        }
    }
}

/// A single alert raised against a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Vehicle the alert belongs to.
    pub mo_id: String,
    /// Alert type (e.g. `"low_fuel"`, `"harsh_braking"`).
    #[serde(rename = "type")]
    pub alert_type: String,
    /// Severity of the alert.
    pub severity: AlertSeverity,
    /// Raise time in milliseconds since the Unix epoch.
    pub ts: i64,
    /// Close time in milliseconds since the Unix epoch. Negative or absent
    /// means the alert is still open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_ts: Option<i64>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Alert {
    /// Whether the alert has not been closed yet.
    pub fn is_open(&self) -> bool {
        self.closed_ts.is_none_or(|ts| ts < 0)
    }
}

/// Response body of an Alert Store query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPage {
    /// Alerts, newest first.
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Open-alert digest for one vehicle.
///
/// Serializes as `{"<Severity>": count, ..., "items": [...], "byType":
/// {"<type>": "<worst severity>"}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    /// Number of open alerts per severity.
    #[serde(flatten)]
    pub counts: BTreeMap<AlertSeverity, u32>,
    /// The open alerts themselves, newest first.
    pub items: Vec<Alert>,
    /// Worst severity seen per alert type.
    #[serde(rename = "byType")]
    pub by_type: BTreeMap<String, AlertSeverity>,
}

impl AlertSummary {
    /// Fold one alert into the summary.
    ///
    /// Within a severity tier the severity recorded first is kept, so feeding
    /// alerts newest first keeps the newest one.
    pub fn record(&mut self, alert: Alert) {
        let count = self.counts.entry(alert.severity).or_insert(0);
        *count = count.saturating_add(1);

        self.by_type
            .entry(alert.alert_type.clone())
            .and_modify(|worst| {
                if alert.severity.tier() > worst.tier() {
                    *worst = alert.severity;
                }
            })
            .or_insert(alert.severity);

        self.items.push(alert);
    }
}
