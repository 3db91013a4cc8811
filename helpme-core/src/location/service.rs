//! The location service: TTL cache, fallbacks and auto-update fan-out.
//!
//! # Lookup flow
//!
//! ```text
//! get_current_location()
//!     │
//!     ├─ cache younger than TTL ──────────────► Cached
//!     │
//!     ├─ permission / services ── denied ─────► Degraded(default)
//!     │
//!     ├─ positioning provider ─── failed ─────► Degraded(stale cache | default)
//!     │
//!     └─ reverse geocode (best effort) ─► commit ─► broadcast ─► Fresh
//! ```
//!
//! # Auto-updates
//!
//! The first subscriber starts one platform watch; every later subscriber
//! shares it. Each delivered reading passes the [`AdmissionPolicy`] before
//! it is geocoded, cached and broadcast. Removing the last subscriber stops
//! the watch.
//!
//! # Locking
//!
//! All mutable state sits behind one mutex. It is never held across an
//! `.await` or while subscriber callbacks run, and every cache write
//! replaces the whole [`CachedLocation`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use super::address::resolve_with_address;
use super::config::LocationConfig;
use super::distance;
use super::error::{LocationError, LocationResult};
use super::outcome::{FallbackSource, LocationOutcome};
use super::policy::{Admission, AdmissionPolicy};
use super::provider::{Clock, LocationProviders, SystemClock, WatchHandle};
use super::subscription::{notify_all, Subscriber, SubscriberRegistry, SubscriptionHandle};
use super::types::{
    AccuracyLevel, CachedLocation, Coordinate, Distance, LocationAccuracy, PermissionResult,
    PositionReading, PositionRequest, ResolvedLocation, WatchOptions,
};

/// Counters describing what the auto-update watch has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchStats {
    /// Readings delivered by the platform watch.
    pub received: u64,
    /// Readings that passed the admission policy.
    pub admitted: u64,
    /// Readings rejected by the time throttle.
    pub rejected_interval: u64,
    /// Readings rejected by the distance throttle.
    pub rejected_distance: u64,
    /// Readings with unusable coordinates.
    pub rejected_invalid: u64,
    /// Results dropped because the service was cleaned up mid-flight.
    pub discarded: u64,
    /// Results dropped because a newer reading was committed first.
    pub superseded: u64,
}

/// Identifies one result on its way to the cache.
///
/// `generation` is read when the lookup starts; `sequence` orders results
/// by when their reading was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    sequence: u64,
}

struct ActiveWatch {
    handle: Box<dyn WatchHandle>,
    pump: JoinHandle<()>,
}

enum WatchSlot {
    Idle,
    Starting,
    Active(ActiveWatch),
}

struct State {
    cache: Option<CachedLocation>,
    last_known: Option<ResolvedLocation>,
    last_update_millis: Option<i64>,
    /// Highest `fetched_at_millis` ever committed; never reset.
    high_water_millis: i64,
    /// Last sequence handed out by `issue_ticket`.
    next_sequence: u64,
    /// Sequence of the newest committed result.
    committed_sequence: u64,
    subscribers: SubscriberRegistry,
    watch: WatchSlot,
    /// Bumped by `cleanup`; results from an older generation are dropped.
    generation: u64,
    stats: WatchStats,
}

impl State {
    fn new() -> Self {
        Self {
            cache: None,
            last_known: None,
            last_update_millis: None,
            high_water_millis: i64::MIN,
            next_sequence: 0,
            committed_sequence: 0,
            subscribers: SubscriberRegistry::default(),
            watch: WatchSlot::Idle,
            generation: 0,
            stats: WatchStats::default(),
        }
    }
}

struct Shared {
    providers: LocationProviders,
    config: LocationConfig,
    policy: AdmissionPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

/// Device location cache with staleness policy and auto-update fan-out.
///
/// Cloning is cheap; clones share the same cache and subscribers. Create
/// one instance at the application root and call
/// [`cleanup`](Self::cleanup) at shutdown.
///
/// # Example
///
/// ```rust,ignore
/// use helpme_core::location::{LocationConfig, LocationService};
///
/// let service = LocationService::new(providers, LocationConfig::from_env());
///
/// // Never fails: falls back to a stale cache or the default location
/// let here = service.get_current_location(false).await;
///
/// let handle = service
///     .subscribe_to_location_updates(|location| println!("moved to {location:?}"))
///     .await;
/// // ...
/// service.unsubscribe(handle);
/// service.cleanup();
/// ```
#[derive(Clone)]
pub struct LocationService {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LocationService")
            .field("cached", &state.cache.is_some())
            .field("subscribers", &state.subscribers.len())
            .field("watching", &matches!(state.watch, WatchSlot::Active(_)))
            .finish_non_exhaustive()
    }
}

impl LocationService {
    /// Creates a service using the system clock.
    #[must_use]
    pub fn new(providers: LocationProviders, config: LocationConfig) -> Self {
        Self::with_clock(providers, config, Arc::new(SystemClock))
    }

    /// Creates a service with an explicit clock.
    #[must_use]
    pub fn with_clock(
        providers: LocationProviders,
        config: LocationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.validate();
        Self {
            shared: Arc::new(Shared {
                providers,
                policy: AdmissionPolicy::from_config(&config),
                config,
                clock,
                state: Mutex::new(State::new()),
            }),
        }
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &LocationConfig {
        &self.shared.config
    }

    /// The configured fallback location.
    #[must_use]
    pub fn default_location(&self) -> ResolvedLocation {
        self.shared.config.default_resolved()
    }

    // Callbacks never run under the lock and the cache is replaced wholesale,
    // so a poisoned guard still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        self.shared.clock.now_millis()
    }

    /// Returns the device location, never failing.
    ///
    /// A cache entry younger than the TTL is returned without touching the
    /// provider unless `force_fresh` is set. Otherwise the provider is
    /// queried; on failure a stale cache entry or the default location is
    /// returned.
    pub async fn get_current_location(&self, force_fresh: bool) -> ResolvedLocation {
        self.lookup(force_fresh).await.into_location()
    }

    /// Like [`get_current_location`](Self::get_current_location) but reports
    /// how the location was obtained.
    pub async fn lookup(&self, force_fresh: bool) -> LocationOutcome {
        self.lookup_with_timeout(force_fresh, self.shared.config.fetch_timeout_ms)
            .await
    }

    /// Drops the cache entry and queries the provider.
    pub async fn force_location_refresh(&self) -> ResolvedLocation {
        tracing::info!("forcing location refresh");
        self.lock().cache = None;
        self.lookup_with_timeout(true, self.shared.config.refresh_timeout_ms)
            .await
            .into_location()
    }

    async fn lookup_with_timeout(&self, force_fresh: bool, timeout_ms: u64) -> LocationOutcome {
        let generation = {
            let state = self.lock();
            if !force_fresh {
                let now = self.now();
                if let Some(cached) = state
                    .cache
                    .as_ref()
                    .filter(|c| c.age_millis(now) < self.shared.config.cache_ttl_ms)
                {
                    tracing::debug!(
                        remaining_ms = self.shared.config.cache_ttl_ms - cached.age_millis(now),
                        "using cached location"
                    );
                    return LocationOutcome::Cached(cached.location.clone());
                }
            }
            state.generation
        };

        if let Err(reason) = self.ensure_permission().await {
            tracing::warn!(%reason, "location access unavailable, using default location");
            return LocationOutcome::Degraded {
                reason,
                source: FallbackSource::DefaultLocation,
                location: self.default_location(),
            };
        }

        match self.fetch_position(timeout_ms).await {
            Ok(reading) => {
                let now = self.now();
                let ticket = self.issue_ticket(generation);
                let location = self.resolve(reading.coordinate()).await;
                tracing::info!(
                    latitude = reading.latitude,
                    longitude = reading.longitude,
                    accuracy = reading.accuracy_meters,
                    "obtained device location"
                );
                if let Some(subscribers) =
                    self.commit(ticket, &location, reading.accuracy_meters, now)
                {
                    self.broadcast(&subscribers, &location);
                }
                LocationOutcome::Fresh(location)
            }
            Err(reason) => self.degrade(reason),
        }
    }

    async fn fetch_position(&self, timeout_ms: u64) -> LocationResult<PositionReading> {
        let request = PositionRequest {
            accuracy: self.shared.config.accuracy,
            timeout_ms,
            max_age_ms: self.shared.config.max_age_ms,
        };
        let reading = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.shared.providers.position.current_position(request),
        )
        .await
        .map_err(|_| LocationError::Timeout {
            after_ms: timeout_ms,
        })??;

        if reading.coordinate().is_valid() {
            Ok(reading)
        } else {
            Err(LocationError::Provider(format!(
                "invalid coordinate ({}, {})",
                reading.latitude, reading.longitude
            )))
        }
    }

    /// Picks the fallback for a failed fetch: a stale cache entry if it is
    /// not too old, else the default location.
    fn degrade(&self, reason: LocationError) -> LocationOutcome {
        let now = self.now();
        let stale = {
            let state = self.lock();
            state
                .cache
                .as_ref()
                .filter(|c| c.age_millis(now) <= self.shared.config.max_stale_fallback_ms)
                .map(|c| c.location.clone())
        };

        if let Some(location) = stale {
            tracing::warn!(%reason, "location fetch failed, using cached location");
            LocationOutcome::Degraded {
                reason,
                source: FallbackSource::StaleCache,
                location,
            }
        } else {
            tracing::warn!(%reason, "location fetch failed, using default location");
            LocationOutcome::Degraded {
                reason,
                source: FallbackSource::DefaultLocation,
                location: self.default_location(),
            }
        }
    }

    /// Adds address fields to a coordinate. Geocoding failures are logged
    /// and leave the fields empty.
    async fn resolve(&self, coordinate: Coordinate) -> ResolvedLocation {
        let timeout_ms = self.shared.config.fetch_timeout_ms;
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.shared
                .providers
                .geocoder
                .reverse_geocode(coordinate.latitude, coordinate.longitude),
        )
        .await
        .unwrap_or_else(|_| {
            Err(LocationError::Geocoding(format!(
                "timed out after {timeout_ms}ms"
            )))
        });

        match result {
            Ok(candidates) => resolve_with_address(coordinate, &candidates),
            Err(e) => {
                tracing::warn!(error = %e, "reverse geocoding failed");
                ResolvedLocation::from_coordinate(coordinate)
            }
        }
    }

    fn issue_ticket(&self, generation: u64) -> Ticket {
        let mut state = self.lock();
        state.next_sequence += 1;
        Ticket {
            generation,
            sequence: state.next_sequence,
        }
    }

    /// Replaces the cache entry. Returns the subscribers to notify, or
    /// `None` if the service was cleaned up since the ticket's generation
    /// was read or a newer reading was committed in the meantime.
    fn commit(
        &self,
        ticket: Ticket,
        location: &ResolvedLocation,
        accuracy_meters: Option<f64>,
        now: i64,
    ) -> Option<Vec<(u64, Subscriber)>> {
        let mut state = self.lock();
        if state.generation != ticket.generation {
            state.stats.discarded += 1;
            tracing::debug!("discarding location result that arrived after cleanup");
            return None;
        }
        if ticket.sequence < state.committed_sequence {
            state.stats.superseded += 1;
            tracing::debug!(
                sequence = ticket.sequence,
                committed = state.committed_sequence,
                "discarding location result superseded by a newer reading"
            );
            return None;
        }
        state.committed_sequence = ticket.sequence;

        let fetched_at = now.max(state.high_water_millis);
        state.high_water_millis = fetched_at;
        state.cache = Some(CachedLocation {
            location: location.clone(),
            fetched_at_millis: fetched_at,
            accuracy_meters: accuracy_meters.filter(|m| m.is_finite()).unwrap_or(0.0),
        });
        state.last_known = Some(location.clone());
        state.last_update_millis = state.last_update_millis.max(Some(now));

        Some(state.subscribers.snapshot())
    }

    /// Sends `location` to `subscribers`, then drops channel subscribers
    /// whose receiver is gone. Dropping the last one stops the watch.
    fn broadcast(&self, subscribers: &[(u64, Subscriber)], location: &ResolvedLocation) {
        let delivery = notify_all(subscribers, location);
        if delivery.closed.is_empty() {
            return;
        }

        let released = {
            let mut state = self.lock();
            for id in &delivery.closed {
                state.subscribers.remove_id(*id);
            }
            if state.subscribers.is_empty() {
                std::mem::replace(&mut state.watch, WatchSlot::Idle)
            } else {
                WatchSlot::Idle
            }
        };
        tracing::debug!(
            closed = delivery.closed.len(),
            "removed subscribers with closed channels"
        );
        Self::stop_watch(released);
    }

    /// Checks access before every provider fetch. The platform answer is
    /// never cached, so a revoked grant is noticed on the next fetch.
    async fn ensure_permission(&self) -> LocationResult<()> {
        self.check_access().await.map(|_| ())
    }

    async fn check_access(&self) -> LocationResult<PermissionResult> {
        let permission = &self.shared.providers.permission;
        if !permission.has_services_enabled().await? {
            return Err(LocationError::ServicesDisabled);
        }

        let current = permission.foreground_permission().await?;
        if current.granted {
            return Ok(current);
        }

        let requested = permission.request_foreground_permission().await?;
        if requested.granted {
            Ok(requested)
        } else {
            Err(LocationError::PermissionDenied {
                can_ask_again: requested.can_ask_again,
            })
        }
    }

    /// Asks for foreground location access, prompting if needed.
    ///
    /// Disabled location services count as a denial that cannot be asked
    /// again. Provider failures are logged and reported as a denial.
    pub async fn request_permissions(&self) -> PermissionResult {
        match self.check_access().await {
            Ok(granted) => granted,
            Err(LocationError::PermissionDenied { can_ask_again }) => {
                PermissionResult::denied(can_ask_again)
            }
            Err(LocationError::ServicesDisabled) => PermissionResult::denied(false),
            Err(e) => {
                tracing::error!(error = %e, "error requesting location permissions");
                PermissionResult::denied(false)
            }
        }
    }

    /// Returns true if location services are on and permission is granted.
    /// Never prompts.
    pub async fn is_location_available(&self) -> bool {
        let permission = &self.shared.providers.permission;
        let services = permission.has_services_enabled().await;
        let current = permission.foreground_permission().await;
        match (services, current) {
            (Ok(services), Ok(current)) => services && current.granted,
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "error checking location availability");
                false
            }
        }
    }

    /// Registers `callback` for auto-updates.
    ///
    /// The first registration starts the platform watch. If permission is
    /// denied the registration is kept but no watch runs; a later
    /// registration retries.
    pub async fn subscribe_to_location_updates<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ResolvedLocation) + Send + Sync + 'static,
    {
        self.register(Subscriber::Callback(Arc::new(callback))).await
    }

    /// Registers a channel for auto-updates.
    ///
    /// Dropping the receiver ends the subscription at the next broadcast,
    /// as if [`unsubscribe`](Self::unsubscribe) had been called.
    pub async fn subscribe_channel(
        &self,
    ) -> (SubscriptionHandle, UnboundedReceiver<ResolvedLocation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.register(Subscriber::Channel(tx)).await;
        (handle, rx)
    }

    async fn register(&self, subscriber: Subscriber) -> SubscriptionHandle {
        let (handle, start) = {
            let mut state = self.lock();
            let handle = state.subscribers.insert(subscriber);
            let start = matches!(state.watch, WatchSlot::Idle);
            if start {
                state.watch = WatchSlot::Starting;
            }
            (handle, start)
        };
        tracing::debug!(subscriber = handle.id(), "location subscriber added");

        if start {
            self.start_watch().await;
        }
        handle
    }

    /// Removes a registration. Removing the last one stops the watch.
    ///
    /// Returns false if the handle was already removed (e.g. by `cleanup`).
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let released = {
            let mut state = self.lock();
            if !state.subscribers.remove(&handle) {
                return false;
            }
            if state.subscribers.is_empty() {
                std::mem::replace(&mut state.watch, WatchSlot::Idle)
            } else {
                WatchSlot::Idle
            }
        };
        tracing::debug!(subscriber = handle.id(), "location subscriber removed");
        Self::stop_watch(released);
        true
    }

    async fn start_watch(&self) {
        let generation = self.lock().generation;

        if let Err(reason) = self.ensure_permission().await {
            tracing::warn!(%reason, "cannot start automatic location updates");
            self.abandon_start(generation);
            return;
        }

        let options = WatchOptions {
            accuracy: self.shared.config.accuracy,
            min_interval_ms: u64::try_from(self.shared.config.min_update_interval_ms).unwrap_or(0),
            min_distance_m: self.shared.config.significant_distance_m,
        };
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = match self.shared.providers.position.watch_position(options, tx).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "failed to start automatic location updates");
                self.abandon_start(generation);
                return;
            }
        };

        let mut state = self.lock();
        let wanted = state.generation == generation
            && !state.subscribers.is_empty()
            && matches!(state.watch, WatchSlot::Starting);
        if !wanted {
            drop(state);
            tracing::debug!("watch no longer needed, removing it");
            handle.remove();
            return;
        }

        let pump = tokio::spawn(Self::pump(Arc::downgrade(&self.shared), rx));
        state.watch = WatchSlot::Active(ActiveWatch { handle, pump });
        drop(state);
        tracing::info!("started automatic location updates");
    }

    fn abandon_start(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation && matches!(state.watch, WatchSlot::Starting) {
            state.watch = WatchSlot::Idle;
        }
    }

    fn stop_watch(slot: WatchSlot) {
        if let WatchSlot::Active(active) = slot {
            active.handle.remove();
            active.pump.abort();
            tracing::info!("stopped automatic location updates");
        }
    }

    async fn pump(shared: Weak<Shared>, mut readings: UnboundedReceiver<PositionReading>) {
        while let Some(reading) = readings.recv().await {
            let Some(shared) = shared.upgrade() else {
                break;
            };
            Self { shared }.handle_watch_reading(reading).await;
        }
        tracing::debug!("location watch channel closed");
    }

    /// Runs one watch reading through admission, geocoding, commit and
    /// broadcast.
    pub(crate) async fn handle_watch_reading(&self, reading: PositionReading) -> Admission {
        let coordinate = reading.coordinate();
        let now = self.now();

        let (admission, ticket) = {
            let mut state = self.lock();
            state.stats.received += 1;
            let previous = state.last_known.as_ref().map(ResolvedLocation::coordinate);
            let admission =
                self.shared
                    .policy
                    .evaluate(now, state.last_update_millis, previous, coordinate);
            match admission {
                Admission::Admit => {
                    state.stats.admitted += 1;
                    state.last_update_millis = state.last_update_millis.max(Some(now));
                }
                Admission::TooSoon { .. } => state.stats.rejected_interval += 1,
                Admission::TooClose { .. } => state.stats.rejected_distance += 1,
                Admission::Invalid => state.stats.rejected_invalid += 1,
            }
            state.next_sequence += 1;
            let ticket = Ticket {
                generation: state.generation,
                sequence: state.next_sequence,
            };
            (admission, ticket)
        };

        if !admission.is_admitted() {
            tracing::trace!(?admission, "watch reading rejected");
            return admission;
        }

        let location = self.resolve(coordinate).await;
        if let Some(subscribers) = self.commit(ticket, &location, reading.accuracy_meters, now) {
            tracing::info!(
                latitude = location.latitude,
                longitude = location.longitude,
                subscribers = subscribers.len(),
                "auto location update"
            );
            self.broadcast(&subscribers, &location);
        }
        admission
    }

    /// Accuracy bucket, radius and age of the cached reading.
    #[must_use]
    pub fn get_location_accuracy(&self) -> LocationAccuracy {
        let now = self.now();
        let cached = self.lock().cache.clone();
        cached
            .as_ref()
            .map_or_else(LocationAccuracy::none, |cached| LocationAccuracy {
                level: AccuracyLevel::from_meters(cached.accuracy_meters),
                meters: Some(cached.accuracy_meters),
                age_secs: Some((cached.age_millis(now) + 500) / 1000),
            })
    }

    /// Great-circle distance between two coordinates.
    #[must_use]
    pub fn calculate_distance(a: Coordinate, b: Coordinate) -> Distance {
        distance::calculate_distance(a, b)
    }

    /// The most recently resolved location, kept across forced refreshes.
    #[must_use]
    pub fn last_known_location(&self) -> Option<ResolvedLocation> {
        self.lock().last_known.clone()
    }

    /// A copy of the current cache entry.
    #[must_use]
    pub fn cached_location(&self) -> Option<CachedLocation> {
        self.lock().cache.clone()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Returns true while a platform watch is running.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        matches!(self.lock().watch, WatchSlot::Active(_))
    }

    /// Watch counters.
    #[must_use]
    pub fn watch_stats(&self) -> WatchStats {
        self.lock().stats
    }

    /// Stops the watch, drops all subscribers and clears the cache.
    ///
    /// Safe to call repeatedly. Fetches still in flight return their result
    /// to their caller but do not repopulate the cache.
    pub fn cleanup(&self) {
        let released = {
            let mut state = self.lock();
            state.generation += 1;
            state.subscribers.clear();
            state.cache = None;
            state.last_known = None;
            state.last_update_millis = None;
            std::mem::replace(&mut state.watch, WatchSlot::Idle)
        };
        Self::stop_watch(released);
        tracing::debug!("location service cleaned up");
    }
}
