// ── Connection manager ──
//
// Single choke point for every GeoServer call. Adds what the raw client
// lacks: health tracking with edge-triggered events, retry with
// exponential backoff, a TTL response cache, and atomic config swaps.

mod cache;
mod event;
mod health;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use conescout_api::{FeatureCollection, FeatureInfoRequest, GeoServerClient, LatLng};

use crate::config::ConnectionConfig;
use crate::error::CoreError;
use crate::map::layer::{WmsLayerHandle, WmsLayerOptions};
use crate::map::viewport::Viewport;

use self::cache::ResponseCache;
pub use self::event::{ConnectionEvent, HealthError, RequestFailure};
pub use self::health::ConnectionHealth;
use self::health::Transition;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Base delay before the first retry; doubles per attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

// ── Per-call options ─────────────────────────────────────────────────

/// Options for [`ConnectionManager::execute_with_retry`].
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    /// Serve from and store into the cache under this key.
    pub cache_key: Option<String>,
    /// Retries after the first attempt. `None` uses the configured count.
    pub retries: Option<u32>,
    /// Backoff base. `None` uses [`DEFAULT_RETRY_DELAY`].
    pub retry_delay: Option<Duration>,
    /// Skip `RequestError` events; failures only reach the caller.
    pub silent: bool,
}

impl RetryOptions {
    pub fn cached(key: impl Into<String>) -> Self {
        Self {
            cache_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Options for [`ConnectionManager::get_feature`].
#[derive(Debug, Clone, Default)]
pub struct FeatureOptions {
    /// Sent as WFS `count`.
    pub max_features: Option<u32>,
    /// Overrides the default `wfs_<type>_<filter>` cache key.
    pub retry: RetryOptions,
}

/// Options for [`ConnectionManager::get_feature_info`].
#[derive(Debug, Clone, Default)]
pub struct FeatureInfoOptions {
    /// Defaults to 1.
    pub feature_count: Option<u32>,
    pub styles: Option<String>,
    /// Vendor `ENV` parameter.
    pub env: Option<String>,
    /// Click lookups are uncached unless a key is given here.
    pub retry: RetryOptions,
}

// ── ConnectionManager ────────────────────────────────────────────────

struct Snapshot {
    config: Arc<ConnectionConfig>,
    client: GeoServerClient,
}

impl Snapshot {
    fn build(config: ConnectionConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let client = GeoServerClient::new(config.endpoints(), &config.transport())?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Resilient access to one GeoServer workspace.
///
/// Cheaply cloneable via `Arc<ConnectionInner>`. The cache and the health
/// flag are owned here and never mutated from outside.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    snapshot: ArcSwap<Snapshot>,
    cache: ResponseCache,
    health: watch::Sender<ConnectionHealth>,
    /// Serializes health probes so only one result is in effect at a time.
    health_lock: Mutex<()>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    cancel: CancellationToken,
    monitor: Mutex<Option<MonitorTask>>,
    pending: AtomicUsize,
}

/// Decrements the in-flight counter when a retry call finishes, however it ends.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ConnectionManager {
    /// Validate the config and build the HTTP client. Does not probe the
    /// server; call [`start_health_monitor`](Self::start_health_monitor)
    /// or [`check_health`](Self::check_health) for that.
    pub fn new(config: ConnectionConfig) -> Result<Self, CoreError> {
        let snapshot = Snapshot::build(config)?;
        let (health, _) = watch::channel(ConnectionHealth::Available);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                snapshot: ArcSwap::from_pointee(snapshot),
                cache: ResponseCache::new(),
                health,
                health_lock: Mutex::new(()),
                event_tx,
                cancel: CancellationToken::new(),
                monitor: Mutex::new(None),
                pending: AtomicUsize::new(0),
            }),
        })
    }

    // ── Configuration ────────────────────────────────────────────────

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<ConnectionConfig> {
        Arc::clone(&self.inner.snapshot.load().config)
    }

    fn client(&self) -> GeoServerClient {
        self.inner.snapshot.load().client.clone()
    }

    /// Derive a new config from the current one and swap it in atomically.
    ///
    /// Calls already in flight keep the snapshot they started with. The
    /// cache is cleared since its entries may be keyed to the old server.
    pub fn update_config(
        &self,
        update: impl FnOnce(&mut ConnectionConfig),
    ) -> Result<Arc<ConnectionConfig>, CoreError> {
        let mut next = (*self.config()).clone();
        update(&mut next);
        let snapshot = Snapshot::build(next)?;
        let config = Arc::clone(&snapshot.config);
        self.inner.snapshot.store(Arc::new(snapshot));
        self.clear_cache(None);
        info!(url = %config.base_url, workspace = %config.workspace, "connection config updated");
        Ok(config)
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.inner.health.borrow().clone()
    }

    pub fn watch_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.inner.health.subscribe()
    }

    /// Number of `execute_with_retry` calls currently running.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.load(Ordering::Relaxed)
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<ConnectionEvent> {
        self.inner.event_tx.clone()
    }

    fn emit(&self, event: ConnectionEvent) {
        debug!(event = event.name(), "connection event");
        let _ = self.inner.event_tx.send(event);
    }

    // ── Health ───────────────────────────────────────────────────────

    /// Probe the server and update the health flag.
    ///
    /// Emits `ConnectionError` / `ConnectionRestored` only when the flag
    /// flips. Never fails; any error reads as unavailable.
    pub async fn check_health(&self) -> bool {
        let _probe = self.inner.health_lock.lock().await;
        let client = self.client();

        let outcome = client.check_health().await.map_err(|e| HealthError {
            timestamp: Utc::now(),
            message: e.to_string(),
            status: e.status(),
        });
        let available = outcome.is_ok();

        let mut transition = Transition::Unchanged;
        self.inner.health.send_if_modified(|health| {
            transition = health.record(outcome);
            transition != Transition::Unchanged
        });

        match transition {
            Transition::WentDown => {
                if let Some(err) = self.health().last_error().cloned() {
                    warn!(message = %err.message, status = ?err.status, "GeoServer became unavailable");
                    self.emit(ConnectionEvent::ConnectionError(err));
                }
            }
            Transition::CameUp => {
                info!("GeoServer connection restored");
                self.emit(ConnectionEvent::ConnectionRestored {
                    timestamp: Utc::now(),
                    message: "Connection restored".into(),
                });
            }
            Transition::Unchanged => {}
        }
        available
    }

    /// Spawn the periodic health check: one probe now, then one per
    /// `health_check_interval`. Returns `false` when checks are disabled.
    ///
    /// Starting again replaces the running monitor.
    pub async fn start_health_monitor(&self) -> bool {
        if !self.config().health_check_enabled {
            return false;
        }
        let mut slot = self.inner.monitor.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
            previous.handle.abort();
        }
        let cancel = self.inner.cancel.child_token();
        let handle = tokio::spawn(health_monitor_task(self.clone(), cancel.clone()));
        *slot = Some(MonitorTask { cancel, handle });
        true
    }

    /// Stop the periodic health check and wait for it to exit.
    pub async fn stop_health_monitor(&self) {
        let task = self.inner.monitor.lock().await.take();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.handle.await;
        }
    }

    /// Cancel every background task owned by this manager.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.stop_health_monitor().await;
    }

    // ── Retry / cache ────────────────────────────────────────────────

    /// Run `operation` with caching, retries, and exponential backoff.
    ///
    /// A live cache entry short-circuits the call. Otherwise up to
    /// `retries + 1` attempts are made, waiting `retry_delay * 2^n` after
    /// failed attempt `n`. Before each retry, a known-down server is
    /// re-probed and the call gives up with [`CoreError::ServiceUnavailable`]
    /// if it is still down. A non-transient error ends the call at once.
    /// Every failed attempt emits a `RequestError` unless the call is
    /// silent; the one that ends the call is reported as final.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        options: RetryOptions,
    ) -> Result<T, CoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        if let Some(key) = options.cache_key.as_deref() {
            if let Some(hit) = self.inner.cache.get::<T>(key) {
                debug!(key, "cache hit");
                return Ok(hit);
            }
        }

        let _pending = PendingGuard::enter(&self.inner.pending);
        let config = self.config();
        let max_retries = options.retries.unwrap_or(config.retry_attempts);
        let base_delay = options.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY);
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 && !self.health().is_available() && !self.check_health().await {
                warn!(attempt, "GeoServer still unavailable, abandoning retries");
                return Err(CoreError::ServiceUnavailable);
            }

            match operation().await {
                Ok(value) => {
                    if let Some(key) = options.cache_key {
                        self.inner.cache.insert(key, value.clone(), config.cache_ttl);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = err.is_transient() && attempt < max_retries;
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = max_retries + 1,
                        retryable,
                        error = %err,
                        "request attempt failed"
                    );
                    if !options.silent {
                        self.emit(ConnectionEvent::RequestError(RequestFailure {
                            timestamp: Utc::now(),
                            message: err.to_string(),
                            attempt: attempt + 1,
                            max_retries: if retryable { max_retries } else { attempt },
                            timed_out: err.is_timeout(),
                            layer: None,
                        }));
                    }
                    if !retryable {
                        return Err(err);
                    }
                    last_error = Some(err);
                    tokio::time::sleep(backoff(base_delay, attempt)).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::Internal("retry loop made no attempts".into())))
    }

    /// Drop every cached response, or those whose key starts with `prefix`.
    pub fn clear_cache(&self, prefix: Option<&str>) {
        self.inner.cache.clear(prefix);
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.inner.cache.contains(key)
    }

    // ── GeoServer operations ─────────────────────────────────────────

    /// WFS GetFeature, cached under `wfs_<type>_<filter>` unless overridden.
    pub async fn get_feature(
        &self,
        type_name: &str,
        cql_filter: Option<&str>,
        options: FeatureOptions,
    ) -> Result<FeatureCollection, CoreError> {
        let client = self.client();
        let mut retry = options.retry;
        if retry.cache_key.is_none() {
            retry.cache_key = Some(feature_cache_key(type_name, cql_filter));
        }
        let max_features = options.max_features;

        self.execute_with_retry(
            || async {
                client
                    .get_feature(type_name, cql_filter, max_features)
                    .await
                    .map_err(CoreError::from)
            },
            retry,
        )
        .await
    }

    /// WMS GetFeatureInfo at `latlng` within the given viewport.
    pub async fn get_feature_info(
        &self,
        layer_name: &str,
        latlng: LatLng,
        viewport: &Viewport,
        options: FeatureInfoOptions,
    ) -> Result<FeatureCollection, CoreError> {
        let client = self.client();
        let point = viewport.container_point(latlng);
        let request = FeatureInfoRequest {
            bbox: viewport.bounds,
            width: viewport.width,
            height: viewport.height,
            x: point.x,
            y: point.y,
            feature_count: options.feature_count.unwrap_or(1),
            styles: options.styles,
            env: options.env,
        };

        self.execute_with_retry(
            || async {
                client
                    .get_feature_info(layer_name, &request)
                    .await
                    .map_err(CoreError::from)
            },
            options.retry,
        )
        .await
    }

    /// Legend graphic URL for `layer_name` rendered with `style_name`.
    ///
    /// An empty style returns `Ok(None)` without touching the network.
    /// With `legend_preload` set, the image is fetched first so callers
    /// only receive URLs known to render.
    pub async fn get_legend_url(
        &self,
        layer_name: &str,
        style_name: &str,
        retry: RetryOptions,
    ) -> Result<Option<Url>, CoreError> {
        if style_name.is_empty() {
            return Ok(None);
        }
        let config = self.config();
        let client = self.client();
        let mut retry = retry;
        if retry.cache_key.is_none() {
            retry.cache_key = Some(legend_cache_key(layer_name, style_name));
        }
        let cache_bust = Utc::now().timestamp_millis();

        let url = self
            .execute_with_retry(
                || async {
                    let url = client.legend_url(layer_name, style_name, cache_bust)?;
                    if config.legend_preload {
                        client.preload_legend(&url).await?;
                    }
                    Ok::<_, CoreError>(url)
                },
                retry,
            )
            .await?;
        Ok(Some(url))
    }

    /// Fetch an arbitrary image to confirm it loads. Not retried or cached.
    pub async fn preload_image(&self, url: &Url) -> Result<(), CoreError> {
        self.client().preload_image(url).await.map_err(CoreError::from)
    }

    /// Build a WMS tile layer for `workspace:layer_name`. Pure; no request
    /// is made until the layer is rendered.
    pub fn get_wms_layer(
        &self,
        layer_name: &str,
        options: WmsLayerOptions,
    ) -> Result<WmsLayerHandle, CoreError> {
        let config = self.config();
        let endpoints = config.endpoints();
        Ok(WmsLayerHandle::new(
            layer_name,
            endpoints.qualified(layer_name),
            endpoints.wms_url()?,
            options,
            self.event_sender(),
        ))
    }
}

pub fn feature_cache_key(type_name: &str, cql_filter: Option<&str>) -> String {
    format!("wfs_{type_name}_{}", cql_filter.unwrap_or(""))
}

pub fn legend_cache_key(layer_name: &str, style_name: &str) -> String {
    format!("legend_{layer_name}_{style_name}")
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

async fn health_monitor_task(manager: ConnectionManager, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            available = manager.check_health() => {
                debug!(available, "periodic health check");
            }
        }

        let config = manager.config();
        if !config.health_check_enabled {
            debug!("health checks disabled, monitor exiting");
            break;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.health_check_interval) => {}
        }
    }
}
