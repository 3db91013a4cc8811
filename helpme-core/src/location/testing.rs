//! In-memory providers and a manual clock for tests.
//!
//! Only compiled with the `test-utils` feature. DO NOT use in production.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{self, BoxFuture};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

use super::error::{LocationError, LocationResult};
use super::provider::{
    Clock, GeocodingProvider, LocationProviders, PermissionProvider, PositionProvider, WatchHandle,
};
use super::types::{
    GeocodedAddress, PermissionResult, PermissionStatus, PositionReading, PositionRequest,
    WatchOptions,
};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start_millis`.
    #[must_use]
    pub const fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Permission provider with switchable answers.
#[derive(Debug)]
pub struct FakePermissionProvider {
    services_enabled: AtomicBool,
    granted: AtomicBool,
    grant_on_request: AtomicBool,
    can_ask_again: AtomicBool,
    requests: AtomicUsize,
}

impl FakePermissionProvider {
    /// Services on; the prompt grants access.
    #[must_use]
    pub const fn granting() -> Self {
        Self {
            services_enabled: AtomicBool::new(true),
            granted: AtomicBool::new(false),
            grant_on_request: AtomicBool::new(true),
            can_ask_again: AtomicBool::new(true),
            requests: AtomicUsize::new(0),
        }
    }

    /// Services on; the prompt denies access.
    #[must_use]
    pub const fn denying() -> Self {
        Self {
            services_enabled: AtomicBool::new(true),
            granted: AtomicBool::new(false),
            grant_on_request: AtomicBool::new(false),
            can_ask_again: AtomicBool::new(true),
            requests: AtomicUsize::new(0),
        }
    }

    /// Switches device location services on or off.
    pub fn set_services_enabled(&self, enabled: bool) {
        self.services_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Controls what the next prompt answers.
    pub fn set_grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    /// Revokes a previously granted permission.
    pub fn revoke(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }

    /// Number of prompts shown.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn current(&self) -> PermissionResult {
        if self.granted.load(Ordering::SeqCst) {
            PermissionResult::granted()
        } else {
            PermissionResult {
                granted: false,
                can_ask_again: self.can_ask_again.load(Ordering::SeqCst),
                status: PermissionStatus::Undetermined,
            }
        }
    }
}

impl PermissionProvider for FakePermissionProvider {
    fn has_services_enabled(&self) -> BoxFuture<'_, LocationResult<bool>> {
        Box::pin(future::ready(LocationResult::Ok(
            self.services_enabled.load(Ordering::SeqCst),
        )))
    }

    fn foreground_permission(&self) -> BoxFuture<'_, LocationResult<PermissionResult>> {
        Box::pin(future::ready(LocationResult::Ok(self.current())))
    }

    fn request_foreground_permission(&self) -> BoxFuture<'_, LocationResult<PermissionResult>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let grant = self.grant_on_request.load(Ordering::SeqCst);
        self.granted.store(grant, Ordering::SeqCst);
        let result = if grant {
            PermissionResult::granted()
        } else {
            PermissionResult::denied(self.can_ask_again.load(Ordering::SeqCst))
        };
        Box::pin(future::ready(LocationResult::Ok(result)))
    }
}

/// What the fake answers to a single-shot request.
#[derive(Debug, Clone)]
pub enum FakeFix {
    /// Answer with this reading.
    Reading(PositionReading),
    /// Fail with this error.
    Fail(LocationError),
    /// Never answer.
    Hang,
    /// Answer with this reading once the gate is notified.
    Gated(PositionReading, Arc<Notify>),
}

#[derive(Debug, Default)]
struct WatchRegistry {
    next_id: AtomicU64,
    sinks: Mutex<Vec<(u64, UnboundedSender<PositionReading>)>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_next: AtomicBool,
    last_options: Mutex<Option<WatchOptions>>,
}

struct FakeWatchHandle {
    id: u64,
    registry: Arc<WatchRegistry>,
}

impl WatchHandle for FakeWatchHandle {
    fn remove(self: Box<Self>) {
        self.registry
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _)| *id != self.id);
        self.registry.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Positioning provider with scripted answers and a pushable watch.
#[derive(Debug)]
pub struct FakePositionProvider {
    next: Mutex<FakeFix>,
    calls: AtomicUsize,
    last_request: Mutex<Option<PositionRequest>>,
    watch: Arc<WatchRegistry>,
}

impl FakePositionProvider {
    /// Answers every request with `reading`.
    #[must_use]
    pub fn new(reading: PositionReading) -> Self {
        Self::with_fix(FakeFix::Reading(reading))
    }

    /// Answers every request according to `fix`.
    #[must_use]
    pub fn with_fix(fix: FakeFix) -> Self {
        Self {
            next: Mutex::new(fix),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            watch: Arc::new(WatchRegistry::default()),
        }
    }

    /// Changes the answer for subsequent requests.
    pub fn set_fix(&self, fix: FakeFix) {
        *self.next.lock().unwrap_or_else(PoisonError::into_inner) = fix;
    }

    /// Number of single-shot requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent single-shot request.
    #[must_use]
    pub fn last_request(&self) -> Option<PositionRequest> {
        *self.last_request.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of watches started.
    #[must_use]
    pub fn watch_starts(&self) -> usize {
        self.watch.starts.load(Ordering::SeqCst)
    }

    /// Number of watches removed.
    #[must_use]
    pub fn watch_stops(&self) -> usize {
        self.watch.stops.load(Ordering::SeqCst)
    }

    /// Number of watches currently registered.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.watch
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Options of the most recently started watch.
    #[must_use]
    pub fn last_watch_options(&self) -> Option<WatchOptions> {
        *self
            .watch
            .last_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `watch_position` call fail.
    pub fn fail_next_watch(&self) {
        self.watch.fail_next.store(true, Ordering::SeqCst);
    }

    /// Delivers a reading to every active watch. Returns how many received it.
    pub fn emit(&self, reading: PositionReading) -> usize {
        self.watch
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, sink)| sink.send(reading).is_ok())
            .count()
    }
}

impl PositionProvider for FakePositionProvider {
    fn current_position(
        &self,
        request: PositionRequest,
    ) -> BoxFuture<'_, LocationResult<PositionReading>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request);
        let fix = self.next.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Box::pin(async move {
            match fix {
                FakeFix::Reading(reading) => Ok(reading),
                FakeFix::Fail(error) => Err(error),
                FakeFix::Hang => future::pending().await,
                FakeFix::Gated(reading, gate) => {
                    gate.notified().await;
                    Ok(reading)
                }
            }
        })
    }

    fn watch_position(
        &self,
        options: WatchOptions,
        sink: UnboundedSender<PositionReading>,
    ) -> BoxFuture<'_, LocationResult<Box<dyn WatchHandle>>> {
        let registry = Arc::clone(&self.watch);
        Box::pin(async move {
            if registry.fail_next.swap(false, Ordering::SeqCst) {
                return Err(LocationError::WatchUnavailable(
                    "scripted failure".to_string(),
                ));
            }
            *registry
                .last_options
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(options);
            let id = registry.next_id.fetch_add(1, Ordering::SeqCst);
            registry
                .sinks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((id, sink));
            registry.starts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeWatchHandle { id, registry }) as Box<dyn WatchHandle>)
        })
    }
}

/// Reverse geocoder with a scripted answer.
#[derive(Debug)]
pub struct FakeGeocoder {
    answer: Mutex<LocationResult<Vec<GeocodedAddress>>>,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeGeocoder {
    /// Answers every lookup with `address`.
    #[must_use]
    pub fn with_address(address: GeocodedAddress) -> Self {
        Self::with_answer(Ok(vec![address]))
    }

    /// Fails every lookup.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_answer(Err(LocationError::Geocoding("scripted failure".to_string())))
    }

    /// Answers every lookup with no candidates.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_answer(Ok(Vec::new()))
    }

    fn with_answer(answer: LocationResult<Vec<GeocodedAddress>>) -> Self {
        Self {
            answer: Mutex::new(answer),
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        }
    }

    /// Changes the answer for subsequent lookups.
    pub fn set_answer(&self, answer: LocationResult<Vec<GeocodedAddress>>) {
        *self.answer.lock().unwrap_or_else(PoisonError::into_inner) = answer;
    }

    /// Holds the next lookup until `gate` is notified. Later lookups
    /// answer immediately.
    pub fn hold_next(&self, gate: Arc<Notify>) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate);
    }

    /// Number of lookups received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeocodingProvider for FakeGeocoder {
    fn reverse_geocode(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> BoxFuture<'_, LocationResult<Vec<GeocodedAddress>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            answer
        })
    }
}

/// The three fakes plus a manual clock, wired together.
#[derive(Debug, Clone)]
pub struct FakeProviders {
    /// Permission fake
    pub permission: Arc<FakePermissionProvider>,
    /// Positioning fake
    pub position: Arc<FakePositionProvider>,
    /// Geocoding fake
    pub geocoder: Arc<FakeGeocoder>,
    /// Manual clock
    pub clock: Arc<ManualClock>,
}

impl FakeProviders {
    /// Granting permission, answering with `reading`, geocoding to `address`,
    /// clock at `start_millis`.
    #[must_use]
    pub fn new(reading: PositionReading, address: GeocodedAddress, start_millis: i64) -> Self {
        Self {
            permission: Arc::new(FakePermissionProvider::granting()),
            position: Arc::new(FakePositionProvider::new(reading)),
            geocoder: Arc::new(FakeGeocoder::with_address(address)),
            clock: Arc::new(ManualClock::new(start_millis)),
        }
    }

    /// The providers as trait objects.
    #[must_use]
    pub fn providers(&self) -> LocationProviders {
        LocationProviders::new(
            Arc::clone(&self.permission) as Arc<dyn PermissionProvider>,
            Arc::clone(&self.position) as Arc<dyn PositionProvider>,
            Arc::clone(&self.geocoder) as Arc<dyn GeocodingProvider>,
        )
    }

    /// The clock as a trait object.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock) as Arc<dyn Clock>
    }
}
