//! Per-app consumer state over a [`LocationService`].
//!
//! A [`LocationSession`] tracks what a UI needs: the permission state, the
//! location currently shown, whether a lookup is running, a short list of
//! recent locations and the auto-update toggle. Its persistent part is a
//! [`SessionSnapshot`] that the host stores as JSON.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use super::error::LocationError;
use super::outcome::{FallbackSource, LocationOutcome};
use super::service::LocationService;
use super::subscription::SubscriptionHandle;
use super::types::{AccuracyLevel, LocationAccuracy, ResolvedLocation};

/// Maximum number of recent locations kept.
pub const MAX_RECENT_LOCATIONS: usize = 5;

/// Coordinates closer than this on both axes count as the same place.
pub const RECENT_DEDUP_DEGREES: f64 = 0.001;

/// Separator between status line parts.
const STATUS_SEPARATOR: &str = " • ";

/// Location permission as last observed by the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionState {
    /// Never asked.
    #[default]
    NotDetermined,
    /// Access granted.
    Granted,
    /// Access denied.
    Denied,
}

/// Recently seen locations, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentLocations(Vec<ResolvedLocation>);

impl RecentLocations {
    /// Builds a list from stored entries, dropping near-duplicates and
    /// anything past the limit.
    #[must_use]
    pub fn from_entries(entries: Vec<ResolvedLocation>) -> Self {
        let mut recent = Self(Vec::with_capacity(MAX_RECENT_LOCATIONS));
        for entry in entries {
            if recent.0.len() == MAX_RECENT_LOCATIONS {
                break;
            }
            if !recent.0.iter().any(|kept| same_place(kept, &entry)) {
                recent.0.push(entry);
            }
        }
        recent
    }

    /// Puts `location` in front. The previous five entries are considered;
    /// any of them too close to an earlier entry is dropped.
    pub fn record(&mut self, location: ResolvedLocation) {
        let mut candidates = Vec::with_capacity(MAX_RECENT_LOCATIONS + 1);
        candidates.push(location);
        candidates.extend(self.0.drain(..).take(MAX_RECENT_LOCATIONS - 1));
        *self = Self::from_entries(candidates);
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Entries, newest first.
    #[must_use]
    pub fn as_slice(&self) -> &[ResolvedLocation] {
        &self.0
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn same_place(a: &ResolvedLocation, b: &ResolvedLocation) -> bool {
    (a.latitude - b.latitude).abs() < RECENT_DEDUP_DEGREES
        && (a.longitude - b.longitude).abs() < RECENT_DEDUP_DEGREES
}

/// The persistent part of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    /// Recent locations, newest first.
    pub recent_locations: RecentLocations,
    /// Last observed permission state.
    pub permission: PermissionState,
    /// Whether auto-updates were switched on.
    pub auto_location_enabled: bool,
}

impl SessionSnapshot {
    /// Serializes to JSON for the host's key-value store.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a valid snapshot.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Default)]
struct SessionState {
    current: Option<ResolvedLocation>,
    loading: usize,
    permission: PermissionState,
    recent: RecentLocations,
    auto_enabled: bool,
    subscription: Option<SubscriptionHandle>,
}

/// Marks the session as loading until dropped.
struct LoadingGuard(Arc<Mutex<SessionState>>);

impl LoadingGuard {
    fn begin(state: &Arc<Mutex<SessionState>>) -> Self {
        lock(state).loading += 1;
        Self(Arc::clone(state))
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.0);
        state.loading = state.loading.saturating_sub(1);
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumer facade over a [`LocationService`].
///
/// # Example
///
/// ```rust,ignore
/// let session = LocationSession::new(service.clone());
///
/// session.get_current_location().await;
/// session.set_auto_location(true).await;
/// println!("{}", session.status_line());
///
/// store.put("location_session", session.snapshot().to_json()?);
/// ```
pub struct LocationSession {
    service: LocationService,
    state: Arc<Mutex<SessionState>>,
}

impl std::fmt::Debug for LocationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("LocationSession")
            .field("permission", &state.permission)
            .field("current", &state.current)
            .field("recent", &state.recent.len())
            .field("auto_enabled", &state.auto_enabled)
            .finish_non_exhaustive()
    }
}

impl LocationSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(service: LocationService) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// Creates a session from a stored snapshot.
    ///
    /// Auto-updates restart when they were enabled and permission was
    /// granted.
    pub async fn restore(service: LocationService, snapshot: SessionSnapshot) -> Self {
        let session = Self::new(service);
        {
            let mut state = lock(&session.state);
            state.recent = RecentLocations::from_entries(snapshot.recent_locations.0);
            state.permission = snapshot.permission;
            state.auto_enabled = snapshot.auto_location_enabled;
        }
        if snapshot.auto_location_enabled && snapshot.permission == PermissionState::Granted {
            session.start_tracking().await;
        }
        session
    }

    /// The persistent part of this session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);
        SessionSnapshot {
            recent_locations: state.recent.clone(),
            permission: state.permission,
            auto_location_enabled: state.auto_enabled,
        }
    }

    /// Asks for location access and records the answer.
    pub async fn request_location_permission(&self) -> bool {
        let result = self.service.request_permissions().await;
        lock(&self.state).permission = if result.granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        result.granted
    }

    /// Looks up the device location, prompting first if needed.
    ///
    /// Without permission the default location is shown. Locations that
    /// came from the device or its cache are added to the recent list.
    pub async fn get_current_location(&self) -> ResolvedLocation {
        let _loading = LoadingGuard::begin(&self.state);

        if self.permission() != PermissionState::Granted
            && !self.request_location_permission().await
        {
            let fallback = self.service.default_location();
            lock(&self.state).current = Some(fallback.clone());
            return fallback;
        }

        let outcome = self.service.lookup(false).await;
        self.show(&outcome);
        outcome.into_location()
    }

    /// Forces a fresh lookup and records the result.
    pub async fn refresh_location(&self) -> ResolvedLocation {
        let _loading = LoadingGuard::begin(&self.state);
        let location = self.service.force_location_refresh().await;
        {
            let mut state = lock(&self.state);
            state.current = Some(location.clone());
            state.recent.record(location.clone());
        }
        location
    }

    fn show(&self, outcome: &LocationOutcome) {
        let mut state = lock(&self.state);
        state.current = Some(outcome.location().clone());
        if outcome.reason().is_some_and(LocationError::is_access_error) {
            tracing::info!("location access lost, marking permission denied");
            state.permission = PermissionState::Denied;
        }
        let is_default = matches!(
            outcome,
            LocationOutcome::Degraded {
                source: FallbackSource::DefaultLocation,
                ..
            }
        );
        if !is_default {
            state.recent.record(outcome.location().clone());
        }
    }

    /// Switches auto-updates on or off.
    ///
    /// Tracking only starts when permission has been granted; the setting
    /// is remembered either way.
    pub async fn set_auto_location(&self, enabled: bool) {
        let start = {
            let mut state = lock(&self.state);
            state.auto_enabled = enabled;
            enabled && state.permission == PermissionState::Granted
        };
        if start {
            self.start_tracking().await;
        } else {
            self.stop_tracking();
        }
    }

    async fn start_tracking(&self) {
        self.stop_tracking();

        let weak: Weak<Mutex<SessionState>> = Arc::downgrade(&self.state);
        let handle = self
            .service
            .subscribe_to_location_updates(move |location| {
                if let Some(state) = weak.upgrade() {
                    let mut state = lock(&state);
                    state.current = Some(location.clone());
                    state.recent.record(location.clone());
                }
            })
            .await;

        let stale = {
            let mut state = lock(&self.state);
            if state.auto_enabled {
                state.subscription.replace(handle)
            } else {
                Some(handle)
            }
        };
        if let Some(stale) = stale {
            self.service.unsubscribe(stale);
        }
        tracing::debug!("auto location tracking started");
    }

    fn stop_tracking(&self) {
        let handle = lock(&self.state).subscription.take();
        if let Some(handle) = handle {
            self.service.unsubscribe(handle);
            tracing::debug!("auto location tracking stopped");
        }
    }

    /// Empties the recent list.
    pub fn clear_recent_locations(&self) {
        lock(&self.state).recent.clear();
    }

    /// Recent locations, newest first.
    #[must_use]
    pub fn recent_locations(&self) -> Vec<ResolvedLocation> {
        lock(&self.state).recent.as_slice().to_vec()
    }

    /// The location currently shown.
    #[must_use]
    pub fn current_location(&self) -> Option<ResolvedLocation> {
        lock(&self.state).current.clone()
    }

    /// Accuracy of the service's cached reading.
    #[must_use]
    pub fn location_accuracy(&self) -> LocationAccuracy {
        self.service.get_location_accuracy()
    }

    /// Returns true while a lookup started by this session is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        lock(&self.state).loading > 0
    }

    /// Last observed permission state.
    #[must_use]
    pub fn permission(&self) -> PermissionState {
        lock(&self.state).permission
    }

    /// Whether auto-updates are switched on.
    #[must_use]
    pub fn auto_location_enabled(&self) -> bool {
        lock(&self.state).auto_enabled
    }

    /// Returns true while this session holds an auto-update subscription.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        lock(&self.state).subscription.is_some()
    }

    /// One-line human readable status.
    ///
    /// ```text
    /// Permission required
    /// Getting location...
    /// No location
    /// Auto-updating • High accuracy (±8m) • 2min old
    /// ```
    #[must_use]
    pub fn status_line(&self) -> String {
        let (permission, loading, has_location, auto_enabled) = {
            let state = lock(&self.state);
            (
                state.permission,
                state.loading > 0,
                state.current.is_some(),
                state.auto_enabled,
            )
        };

        if permission != PermissionState::Granted {
            return "Permission required".to_string();
        }
        if loading {
            return "Getting location...".to_string();
        }
        if !has_location {
            return "No location".to_string();
        }

        let accuracy = self.location_accuracy();
        let mut parts = Vec::with_capacity(3);
        if auto_enabled {
            parts.push("Auto-updating".to_string());
        }
        match (accuracy.level, accuracy.meters) {
            (AccuracyLevel::None, _) | (_, None) => parts.push("Location available".to_string()),
            (level, Some(meters)) => {
                parts.push(format!("{} accuracy (±{meters}m)", level.label()));
            }
        }
        if let Some(age) = accuracy.age_secs.filter(|age| *age > 60) {
            parts.push(format!("{}min old", (age + 30) / 60));
        }
        parts.join(STATUS_SEPARATOR)
    }

    /// Drops this session's auto-update subscription.
    pub fn close(&self) {
        self.stop_tracking();
    }
}

impl Drop for LocationSession {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::testing::{FakeFix, FakeProviders};
    use crate::location::types::{GeocodedAddress, PositionReading};
    use crate::location::LocationConfig;

    const START: i64 = 1_700_000_000_000;
    const HOME: PositionReading = PositionReading::new(41.0082, 28.9784, 8.0);

    fn at(latitude: f64, longitude: f64) -> ResolvedLocation {
        ResolvedLocation::from_coordinate(crate::location::Coordinate::new(latitude, longitude))
    }

    fn setup() -> (LocationSession, LocationService, FakeProviders) {
        let fakes = FakeProviders::new(HOME, GeocodedAddress::default(), START);
        let service = LocationService::with_clock(
            fakes.providers(),
            LocationConfig::default(),
            fakes.clock(),
        );
        (LocationSession::new(service.clone()), service, fakes)
    }

    #[test]
    fn recent_list_is_newest_first_and_capped() {
        let mut recent = RecentLocations::default();
        for i in 0..7 {
            recent.record(at(40.0 + f64::from(i), 29.0));
        }

        assert_eq!(recent.len(), MAX_RECENT_LOCATIONS);
        assert!((recent.as_slice()[0].latitude - 46.0).abs() < f64::EPSILON);
        assert!((recent.as_slice()[4].latitude - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recent_list_drops_near_duplicates() {
        let mut recent = RecentLocations::default();
        recent.record(at(41.0, 29.0));
        recent.record(at(41.0005, 29.0005));

        assert_eq!(recent.len(), 1);
        assert!((recent.as_slice()[0].latitude - 41.0005).abs() < f64::EPSILON);
    }

    #[test]
    fn recent_list_keeps_places_apart_on_one_axis() {
        let mut recent = RecentLocations::default();
        recent.record(at(41.0, 29.0));
        recent.record(at(41.0, 29.002));

        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn permission_state_serializes_kebab_case() {
        let json = serde_json::to_string(&PermissionState::NotDetermined).unwrap();
        assert_eq!(json, "\"not-determined\"");
    }

    #[test]
    fn snapshot_json_tolerates_missing_fields() {
        let snapshot = SessionSnapshot::from_json("{\"permission\":\"granted\"}").unwrap();
        assert_eq!(snapshot.permission, PermissionState::Granted);
        assert!(snapshot.recent_locations.is_empty());
        assert!(!snapshot.auto_location_enabled);
    }

    #[tokio::test]
    async fn status_requires_permission_first() {
        let (session, _service, _fakes) = setup();
        assert_eq!(session.status_line(), "Permission required");

        session.request_location_permission().await;
        assert_eq!(session.status_line(), "No location");
    }

    #[tokio::test]
    async fn get_current_location_records_device_fix() {
        let (session, _service, fakes) = setup();

        let location = session.get_current_location().await;

        assert_eq!(session.permission(), PermissionState::Granted);
        assert_eq!(session.current_location(), Some(location.clone()));
        assert_eq!(session.recent_locations(), vec![location]);
        assert!(!session.is_loading());
        assert_eq!(session.status_line(), "High accuracy (±8m)");

        fakes.clock.advance(150_000);
        assert_eq!(session.status_line(), "High accuracy (±8m) • 3min old");
    }

    #[tokio::test]
    async fn denied_permission_shows_default_without_recording() {
        let (session, service, fakes) = setup();
        fakes.permission.set_grant_on_request(false);

        let location = session.get_current_location().await;

        assert_eq!(location, service.default_location());
        assert_eq!(session.permission(), PermissionState::Denied);
        assert!(session.recent_locations().is_empty());
        assert_eq!(fakes.position.call_count(), 0);
    }

    #[tokio::test]
    async fn revoked_permission_is_reflected_in_session() {
        let (session, service, fakes) = setup();
        session.get_current_location().await;
        assert_eq!(session.permission(), PermissionState::Granted);

        fakes.permission.revoke();
        fakes.permission.set_grant_on_request(false);
        fakes.clock.advance(300_000);
        let location = session.get_current_location().await;

        assert_eq!(location, service.default_location());
        assert_eq!(session.permission(), PermissionState::Denied);
        assert_eq!(session.status_line(), "Permission required");
        assert_eq!(session.recent_locations().len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_default_without_recording() {
        let (session, service, fakes) = setup();
        fakes
            .position
            .set_fix(FakeFix::Fail(LocationError::Provider("no fix".to_string())));

        let location = session.get_current_location().await;

        assert_eq!(location, service.default_location());
        assert!(session.recent_locations().is_empty());
        assert_eq!(session.status_line(), "Location available");
    }

    #[tokio::test]
    async fn refresh_records_location() {
        let (session, _service, fakes) = setup();
        session.get_current_location().await;

        fakes
            .position
            .set_fix(FakeFix::Reading(PositionReading::new(41.02, 28.99, 40.0)));
        session.refresh_location().await;

        assert_eq!(session.recent_locations().len(), 2);
        assert_eq!(session.status_line(), "Medium accuracy (±40m)");
    }

    #[tokio::test]
    async fn auto_location_needs_permission() {
        let (session, service, _fakes) = setup();

        session.set_auto_location(true).await;
        assert!(session.auto_location_enabled());
        assert!(!session.is_tracking());
        assert_eq!(service.subscriber_count(), 0);

        session.request_location_permission().await;
        session.set_auto_location(true).await;
        assert!(session.is_tracking());
        assert_eq!(service.subscriber_count(), 1);

        session.set_auto_location(false).await;
        assert!(!session.is_tracking());
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn enabling_twice_keeps_one_subscription() {
        let (session, service, _fakes) = setup();
        session.request_location_permission().await;

        session.set_auto_location(true).await;
        session.set_auto_location(true).await;

        assert_eq!(service.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn auto_updates_set_current_location() {
        let (session, service, fakes) = setup();
        session.request_location_permission().await;
        session.set_auto_location(true).await;

        service.handle_watch_reading(HOME).await;

        assert!(session.current_location().is_some());
        assert_eq!(session.recent_locations().len(), 1);
        fakes.clock.advance(1_000);
        assert!(session.status_line().starts_with("Auto-updating • High accuracy"));
    }

    #[tokio::test]
    async fn snapshot_restore_restarts_tracking() {
        let (session, service, _fakes) = setup();
        session.get_current_location().await;
        session.set_auto_location(true).await;
        let json = session.snapshot().to_json().unwrap();
        session.close();
        assert_eq!(service.subscriber_count(), 0);

        let snapshot = SessionSnapshot::from_json(&json).unwrap();
        let restored = LocationSession::restore(service.clone(), snapshot).await;

        assert_eq!(restored.permission(), PermissionState::Granted);
        assert!(restored.auto_location_enabled());
        assert!(restored.is_tracking());
        assert_eq!(restored.recent_locations().len(), 1);
        assert_eq!(service.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn restore_without_permission_does_not_track() {
        let (_session, service, _fakes) = setup();
        let snapshot = SessionSnapshot {
            auto_location_enabled: true,
            permission: PermissionState::Denied,
            ..SessionSnapshot::default()
        };

        let restored = LocationSession::restore(service.clone(), snapshot).await;

        assert!(!restored.is_tracking());
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_session_unsubscribes() {
        let (session, service, _fakes) = setup();
        session.request_location_permission().await;
        session.set_auto_location(true).await;

        drop(session);

        assert_eq!(service.subscriber_count(), 0);
        assert!(!service.is_watching());
    }

    #[tokio::test]
    async fn clear_recent_locations_empties_list() {
        let (session, _service, _fakes) = setup();
        session.get_current_location().await;

        session.clear_recent_locations();

        assert!(session.recent_locations().is_empty());
    }
}
