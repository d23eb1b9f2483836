//! The stream hub: client subscriptions and the self-paced tick loop.
//!
//! Each tick the hub snapshots its clients and serves all of them
//! concurrently:
//!
//! - **Vehicle** subscriptions and extents too small to partition get one
//!   direct Probe Store fetch, alert correlation, and one raw `probe` frame.
//! - **Extent** subscriptions large enough to partition get a region grid.
//!   When the grid differs from the one cached for the client, the hub sends
//!   `region start`, fans out one fetch per sub-cell through the client's
//!   [`TaskQueue`], sends one aggregated `probe` frame, then `region end`.
//!   When the grid is unchanged, only the cells whose count or centroid
//!   changed are sent, without region frames.
//!
//! The next tick is scheduled a fixed delay after every client's work for the
//! current tick has settled, so at most one tick is ever in flight.
//!
//! Failures stay local: a failed cell fetch turns that cell's count into
//! `-1` and a failed alert fetch only drops the alert decoration. Frames are
//! pushed without waiting: a client whose channel is full or closed loses
//! that frame and nobody else is affected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use fleetwatch_geo::{
    GridOptions, Partition, Region, RegionGrid, Summary, aggregate, convert_to_device_info,
    create_regions, merge_failures, split_into_sub_cells,
};
use fleetwatch_types::{
    BoundingBox, Center, ClientId, DeviceInfo, GroupDevice, OutboundFrame, ProbeSample, RegionId,
    RegionState, SubscriptionFilter,
};
use futures::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::correlator::AlertCorrelator;
use crate::error::{StoreError, StreamError};
use crate::queue::{Task, TaskCanceled, TaskQueue};
use crate::store::{AlertStore, ProbeQuery, ProbeStore};

/// Channel through which a client receives its frames.
pub type ClientSink = mpsc::Sender<OutboundFrame>;

/// Tuning of the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Delay between the end of one tick and the start of the next.
    pub tick_interval: Duration,
    /// Partitioning threshold and divisions.
    pub grid: GridOptions,
    /// Largest sub-cell, in degrees per axis, fetched in one request.
    pub max_sub_cell_deg: f64,
    /// Maximum cell fetches in flight per client.
    pub max_concurrent_fetches: usize,
    /// Maximum alerts requested per correlation.
    pub alert_limit: u32,
    /// Capacity of each client's frame channel.
    pub client_channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            grid: GridOptions::default(),
            max_sub_cell_deg: 1.0,
            max_concurrent_fetches: 8,
            alert_limit: 200,
            client_channel_capacity: 64,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Clients served.
    pub clients: usize,
    /// Wall-clock duration of the tick.
    pub elapsed: Duration,
}

/// Last values sent for a cell, used to compute incremental updates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fingerprint {
    count: i64,
    center: Option<Center>,
}

#[derive(Debug, Default)]
struct ClientCache {
    grid: Option<RegionGrid>,
    sent: BTreeMap<RegionId, Fingerprint>,
}

/// Result of one sub-cell fetch.
#[derive(Debug)]
struct CellFetch {
    region: RegionId,
    result: Result<Vec<ProbeSample>, StoreError>,
}

#[derive(Debug)]
struct Client {
    id: ClientId,
    filter: SubscriptionFilter,
    sink: ClientSink,
    cache: tokio::sync::Mutex<ClientCache>,
    queue: TaskQueue<CellFetch>,
}

impl Client {
    /// Push a frame without waiting. A full channel drops the frame so a
    /// client that stopped reading never holds up the tick; a closed one
    /// means the client is going away.
    fn send(&self, frame: OutboundFrame) -> bool {
        match self.sink.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(client = %self.id, "client lagging, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client = %self.id, "client channel closed, frame dropped");
                false
            }
        }
    }
}

/// Owns the connected clients and drives the tick loop.
pub struct StreamHub {
    config: HubConfig,
    probes: Arc<dyn ProbeStore>,
    correlator: AlertCorrelator,
    clients: Mutex<BTreeMap<ClientId, Arc<Client>>>,
}

impl StreamHub {
    /// Create a hub over the given stores.
    pub fn new(config: HubConfig, probes: Arc<dyn ProbeStore>, alerts: Arc<dyn AlertStore>) -> Self {
        let correlator = AlertCorrelator::new(alerts, config.alert_limit);
        Self {
            config,
            probes,
            correlator,
            clients: Mutex::new(BTreeMap::new()),
        }
    }

    /// The hub's configuration.
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a client; frames start flowing on the next tick.
    pub fn subscribe(&self, filter: SubscriptionFilter, sink: ClientSink) -> ClientId {
        let id = ClientId::new();
        let client = Arc::new(Client {
            id,
            filter,
            sink,
            cache: tokio::sync::Mutex::new(ClientCache::default()),
            queue: TaskQueue::new(),
        });
        debug!(client = %id, filter = ?client.filter, "client subscribed");
        self.lock_clients().insert(id, client);
        id
    }

    /// Remove a client and abandon its not-yet-started fetches.
    ///
    /// Returns `false` if the client was not registered.
    pub fn unsubscribe(&self, id: ClientId) -> bool {
        let removed = self.lock_clients().remove(&id);
        removed.is_some_and(|client| {
            let canceled = client.queue.clear();
            debug!(client = %id, canceled, "client unsubscribed");
            true
        })
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.lock_clients().len()
    }

    /// Current subscriptions, in connection order.
    pub fn subscriptions(&self) -> Vec<(ClientId, SubscriptionFilter)> {
        self.lock_clients()
            .values()
            .map(|c| (c.id, c.filter.clone()))
            .collect()
    }

    /// Abandon every client's not-yet-started fetches.
    ///
    /// In-flight ticks finish with `region cancel` for partitioned clients.
    pub fn cancel_pending(&self) -> usize {
        self.snapshot()
            .iter()
            .map(|c| c.queue.clear())
            .fold(0, usize::saturating_add)
    }

    /// Run one tick for every client currently connected.
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let clients = self.snapshot();
        join_all(clients.iter().map(|client| self.serve_client(client))).await;
        TickReport {
            clients: clients.len(),
            elapsed: started.elapsed(),
        }
    }

    /// Tick until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// A shutdown arriving mid-tick cancels pending fetches and lets the
    /// tick settle before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_interval_ms = self.config.tick_interval.as_millis(),
            threshold_m = self.config.grid.threshold_m,
            "stream hub started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let tick = self.tick();
            tokio::pin!(tick);
            let report = tokio::select! {
                report = &mut tick => report,
                _ = shutdown.changed() => {
                    let canceled = self.cancel_pending();
                    debug!(canceled, "shutdown during tick, pending fetches canceled");
                    tick.await;
                    break;
                }
            };
            debug!(
                clients = report.clients,
                elapsed_ms = report.elapsed.as_millis(),
                "tick complete"
            );

            tokio::select! {
                () = tokio::time::sleep(self.config.tick_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("stream hub stopped");
    }

    async fn serve_client(&self, client: &Client) {
        match &client.filter {
            SubscriptionFilter::Vehicle { mo_id } => {
                self.serve_direct(client, ProbeQuery::Vehicle(mo_id.clone())).await;
            }
            SubscriptionFilter::Extent { bbox } => match create_regions(bbox, &self.config.grid) {
                Ok(Partition::Single { geometry }) => {
                    self.serve_direct(client, ProbeQuery::Area(geometry)).await;
                }
                Ok(Partition::Grid(grid)) => {
                    if let Err(e) = self.serve_grid(client, grid).await {
                        warn!(client = %client.id, error = %e, "partitioned fetch failed");
                    }
                }
                Err(e) => warn!(client = %client.id, error = %e, "cannot partition extent"),
            },
        }
    }

    /// One fetch, alert correlation, one raw frame.
    async fn serve_direct(&self, client: &Client, query: ProbeQuery) {
        let frame = match self.probes.get_car_probe(&query).await {
            Ok(mut probes) => {
                if let Err(e) = self.correlator.correlate(&mut probes).await {
                    warn!(client = %client.id, error = %e, "alert correlation skipped");
                }
                OutboundFrame::raw(count_of(probes.len()), probes)
            }
            Err(e) => {
                warn!(client = %client.id, query = ?query, error = %e, "probe fetch failed");
                OutboundFrame::raw(fleetwatch_geo::UNKNOWN_COUNT, Vec::new())
            }
        };
        client.send(frame);
    }

    /// Partitioned fetch over a grid.
    async fn serve_grid(&self, client: &Client, grid: RegionGrid) -> Result<(), StreamError> {
        let mut cache = client.cache.lock().await;
        let key = grid.key();
        let changed = cache
            .grid
            .as_ref()
            .is_none_or(|cached| !cached.same_layout(&grid));

        let opened = if changed {
            debug!(client = %client.id, grid = %key, cells = grid.len(), "new grid");
            cache.grid = Some(grid.clone());
            cache.sent.clear();
            client.send(OutboundFrame::region(key.clone(), RegionState::Start))
        } else {
            true
        };

        // `region cancel` only closes a grid opened by `region start`. An
        // unchanged grid keeps its cache and the next tick diffs against it.
        let fetched = match self.fetch_cells(client, &grid).await {
            Ok(fetched) => fetched,
            Err(e) => {
                if changed {
                    cache.grid = None;
                    if opened {
                        client.send(OutboundFrame::region(key, RegionState::Cancel));
                    }
                }
                return Err(e);
            }
        };
        let Some((samples, failed)) = fetched else {
            debug!(client = %client.id, grid = %key, changed, "tick superseded");
            if changed {
                cache.grid = None;
                if opened {
                    client.send(OutboundFrame::region(key, RegionState::Cancel));
                }
            }
            return Ok(());
        };

        let summary = merge_failures(aggregate(&grid, samples), failed);
        let fingerprints = fingerprints(&summary);
        let info = convert_to_device_info(&summary);

        // A dropped frame leaves the cache as it was: a grid the client never
        // fully received is opened again next tick, and an undelivered
        // update is diffed again.
        if changed {
            let delivered = opened
                && client.send(OutboundFrame::aggregated(key.clone(), info))
                && client.send(OutboundFrame::region(key, RegionState::End));
            if !delivered {
                cache.grid = None;
                return Ok(());
            }
        } else {
            let update = incremental(&grid, &cache.sent, &fingerprints, info);
            if !update.devices.is_empty() && !client.send(OutboundFrame::aggregated(key, update)) {
                return Ok(());
            }
        }
        cache.sent = fingerprints;
        Ok(())
    }

    /// Fetch every sub-cell of the grid through the client's queue.
    ///
    /// Returns `None` if any task was canceled, otherwise the de-duplicated
    /// samples plus the regions whose fetch failed.
    async fn fetch_cells(
        &self,
        client: &Client,
        grid: &RegionGrid,
    ) -> Result<Option<(Vec<ProbeSample>, Vec<Region>)>, StreamError> {
        let leftover = client.queue.clear();
        if leftover > 0 {
            debug!(client = %client.id, leftover, "abandoned stale cell fetches");
        }

        let mut handles = Vec::new();
        for region in grid.regions.values() {
            for sub_cell in split_into_sub_cells(&region.geometry, self.config.max_sub_cell_deg)? {
                handles.push(client.queue.push(self.cell_task(region.id.clone(), sub_cell)));
            }
        }

        let (_, results) = tokio::join!(
            client.queue.run_pending(self.config.max_concurrent_fetches),
            join_all(handles.into_iter().map(|h| h.join()))
        );

        let mut samples = Vec::new();
        let mut failed = BTreeSet::new();
        for result in results {
            match result {
                Ok(CellFetch {
                    result: Ok(probes), ..
                }) => samples.extend(probes),
                Ok(CellFetch {
                    region,
                    result: Err(e),
                }) => {
                    warn!(client = %client.id, region = %region, error = %e, "cell fetch failed");
                    failed.insert(region);
                }
                Err(TaskCanceled) => return Ok(None),
            }
        }

        let failed = failed
            .iter()
            .filter_map(|id| grid.regions.get(id).cloned())
            .collect();
        Ok(Some((drop_edge_duplicates(samples), failed)))
    }

    fn cell_task(&self, region: RegionId, bbox: BoundingBox) -> Task<CellFetch> {
        let probes = Arc::clone(&self.probes);
        Task::with_params((region, bbox), move |(region, bbox)| async move {
            let query = ProbeQuery::Area(bbox);
            let result = probes.get_car_probe(&query).await;
            CellFetch { region, result }
        })
    }

    fn snapshot(&self) -> Vec<Arc<Client>> {
        self.lock_clients().values().cloned().collect()
    }

    fn lock_clients(&self) -> MutexGuard<'_, BTreeMap<ClientId, Arc<Client>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for StreamHub {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamHub")
            .field("config", &self.config)
            .field("clients", &self.client_count())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn count_of(len: usize) -> i64 {
    len as i64
}

/// Adjacent sub-cell queries may both return a sample sitting on their
/// shared edge. Such a sample appears twice with the same vehicle and
/// timestamp; keep its first occurrence. Distinct samples of one vehicle
/// are all kept.
fn drop_edge_duplicates(samples: Vec<ProbeSample>) -> Vec<ProbeSample> {
    let mut seen: BTreeSet<(String, i64)> = BTreeSet::new();
    samples
        .into_iter()
        .filter(|s| seen.insert((s.mo_id.clone(), s.timestamp)))
        .collect()
}

fn fingerprints(summary: &Summary) -> BTreeMap<RegionId, Fingerprint> {
    summary
        .groups
        .iter()
        .map(|g| {
            (
                g.region.id.clone(),
                Fingerprint {
                    count: g.count,
                    center: g.center,
                },
            )
        })
        .collect()
}

/// Cells whose values differ from what the client last saw. Cells that
/// emptied out are reported with a zero count.
fn incremental(
    grid: &RegionGrid,
    previous: &BTreeMap<RegionId, Fingerprint>,
    current: &BTreeMap<RegionId, Fingerprint>,
    info: DeviceInfo,
) -> DeviceInfo {
    let mut devices: Vec<GroupDevice> = info
        .devices
        .into_iter()
        .filter(|d| current.get(&d.group_id) != previous.get(&d.group_id))
        .collect();

    for id in previous.keys().filter(|id| !current.contains_key(*id)) {
        if let Some(region) = grid.regions.get(id) {
            devices.push(GroupDevice {
                aggregated: true,
                group_id: id.clone(),
                geometry: region.geometry,
                valid_geometry: None,
                center: None,
                count: 0,
                alerts: None,
            });
        }
    }

    DeviceInfo {
        count: info.count,
        devices,
    }
}
