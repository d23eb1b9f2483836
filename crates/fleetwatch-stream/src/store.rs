//! Probe Store and Alert Store collaborators.
//!
//! Both stores are reached through object-safe traits returning boxed
//! futures, so the hub can hold them as `Arc<dyn ...>` and tests can swap in
//! in-memory doubles. The production implementations talk HTTP via
//! `reqwest`.
//!
//! No request timeout is configured: a slow upstream call delays only the
//! client whose tick issued it.

use futures::future::BoxFuture;
use fleetwatch_types::{AlertPage, BoundingBox, ProbeSample};
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// What to fetch from the Probe Store.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeQuery {
    /// Latest samples of every vehicle inside an area.
    Area(BoundingBox),
    /// Latest samples of one vehicle.
    Vehicle(String),
}

/// Source of vehicle probe samples.
pub trait ProbeStore: Send + Sync {
    /// Fetch the samples matching `query`.
    fn get_car_probe<'a>(
        &'a self,
        query: &'a ProbeQuery,
    ) -> BoxFuture<'a, Result<Vec<ProbeSample>, StoreError>>;
}

/// Source of vehicle alerts.
pub trait AlertStore: Send + Sync {
    /// Fetch alerts for the given vehicles, newest first, at most `limit`.
    fn get_alerts_for_vehicles<'a>(
        &'a self,
        mo_ids: &'a [String],
        include_closed: bool,
        limit: u32,
    ) -> BoxFuture<'a, Result<AlertPage, StoreError>>;
}

// ---------------------------------------------------------------------------
// HTTP Probe Store
// ---------------------------------------------------------------------------

/// Probe Store reached over HTTP at `{base_url}/carProbe`.
#[derive(Debug, Clone)]
pub struct HttpProbeStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProbeStore {
    /// Create a store client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a store client sharing an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    async fn fetch(&self, query: &ProbeQuery) -> Result<Vec<ProbeSample>, StoreError> {
        let url = format!("{}/carProbe", self.base_url);
        let request = match query {
            ProbeQuery::Area(bbox) => self.client.get(&url).query(&[
                ("min_lon", bbox.min_lon),
                ("min_lat", bbox.min_lat),
                ("max_lon", bbox.max_lon),
                ("max_lat", bbox.max_lat),
            ]),
            ProbeQuery::Vehicle(mo_id) => self.client.get(&url).query(&[("mo_id", mo_id)]),
        };
        send_json(request).await
    }
}

impl ProbeStore for HttpProbeStore {
    fn get_car_probe<'a>(
        &'a self,
        query: &'a ProbeQuery,
    ) -> BoxFuture<'a, Result<Vec<ProbeSample>, StoreError>> {
        Box::pin(self.fetch(query))
    }
}

// ---------------------------------------------------------------------------
// HTTP Alert Store
// ---------------------------------------------------------------------------

/// Alert Store reached over HTTP at `{base_url}/alert`.
#[derive(Debug, Clone)]
pub struct HttpAlertStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAlertStore {
    /// Create a store client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a store client sharing an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    async fn fetch(
        &self,
        mo_ids: &[String],
        include_closed: bool,
        limit: u32,
    ) -> Result<AlertPage, StoreError> {
        let url = format!("{}/alert", self.base_url);
        let request = self.client.get(&url).query(&[
            ("mo_id", mo_ids.join(",")),
            ("includeClosed", include_closed.to_string()),
            ("limit", limit.to_string()),
            ("orderBy", String::from("-ts")),
        ]);
        send_json(request).await
    }
}

impl AlertStore for HttpAlertStore {
    fn get_alerts_for_vehicles<'a>(
        &'a self,
        mo_ids: &'a [String],
        include_closed: bool,
        limit: u32,
    ) -> BoxFuture<'a, Result<AlertPage, StoreError>> {
        Box::pin(self.fetch(mo_ids, include_closed, limit))
    }
}

/// Send a request and decode a JSON body, mapping failures to [`StoreError`].
async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, StoreError> {
    let response = request
        .send()
        .await
        .map_err(|e| StoreError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}
