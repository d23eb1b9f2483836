//! Connection gateway: origin admission and subscription parsing.
//!
//! A [`ConnectionGateway`] owns one route path and an injectable
//! [`OriginPolicy`]. It decides whether a connection request may be upgraded
//! and turns the request's query parameters into a [`SubscriptionFilter`].
//! Nothing here depends on the `WebSocket` transport itself.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::ORIGIN;
use fleetwatch_types::{BoundingBox, SubscriptionFilter};
use serde::Deserialize;

use crate::error::StreamError;

/// Decides whether a connection's declared origin is acceptable.
pub trait OriginPolicy: Send + Sync {
    /// `origin` is the request's `Origin` header, if any.
    fn accepts(&self, origin: Option<&str>) -> bool;
}

/// Accepts the configured application origin and any localhost origin.
///
/// With no application origin configured, every request is accepted.
#[derive(Debug, Clone, Default)]
pub struct AppOriginPolicy {
    app_origin: Option<String>,
}

impl AppOriginPolicy {
    /// Policy for the given application origin (e.g. `https://fleet.example.com`).
    pub fn new(app_origin: Option<String>) -> Self {
        Self {
            app_origin: app_origin.map(|o| o.trim_end_matches('/').to_owned()),
        }
    }
}

impl OriginPolicy for AppOriginPolicy {
    fn accepts(&self, origin: Option<&str>) -> bool {
        let Some(app_origin) = &self.app_origin else {
            return true;
        };
        origin.is_some_and(|o| o.trim_end_matches('/') == app_origin || is_localhost(o))
    }
}

/// Whether an origin's host is the local machine.
fn is_localhost(origin: &str) -> bool {
    let rest = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or(rest);
    let host = if authority.starts_with('[') {
        authority.split_once(']').map_or(authority, |(h, _)| h).trim_start_matches('[')
    } else {
        authority.split(':').next().unwrap_or(authority)
    };
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Query parameters of a subscription request.
///
/// `region` is a URL-encoded JSON bounding box; `mo_id` a vehicle id. When
/// both are present the vehicle subscription wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionParams {
    /// JSON-encoded [`BoundingBox`].
    pub region: Option<String>,
    /// Vehicle identifier.
    pub mo_id: Option<String>,
}

impl SubscriptionParams {
    /// Parse the parameters into a filter.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidSubscription`] if neither parameter is
    /// usable.
    pub fn into_filter(self) -> Result<SubscriptionFilter, StreamError> {
        if let Some(mo_id) = self.mo_id.filter(|id| !id.trim().is_empty()) {
            return Ok(SubscriptionFilter::Vehicle { mo_id });
        }
        let Some(region) = self.region else {
            return Err(StreamError::InvalidSubscription(String::from(
                "expected a `region` or `mo_id` query parameter",
            )));
        };
        let bbox: BoundingBox = serde_json::from_str(&region)
            .map_err(|e| StreamError::InvalidSubscription(format!("bad region: {e}")))?;
        Ok(SubscriptionFilter::Extent { bbox })
    }
}

/// Admission point for one streaming route.
#[derive(Clone)]
pub struct ConnectionGateway {
    path: String,
    policy: Arc<dyn OriginPolicy>,
}

impl ConnectionGateway {
    /// Gateway serving `path` with the given origin policy.
    pub fn new(path: impl Into<String>, policy: Arc<dyn OriginPolicy>) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    /// Route path this gateway serves.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check a connection request's origin.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::OriginRejected`] if the policy refuses it.
    pub fn admit(&self, headers: &HeaderMap) -> Result<(), StreamError> {
        let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        if self.policy.accepts(origin) {
            Ok(())
        } else {
            Err(StreamError::OriginRejected(origin.map(ToOwned::to_owned)))
        }
    }
}

impl core::fmt::Debug for ConnectionGateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionGateway")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
