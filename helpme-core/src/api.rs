//! Root composition point handed to the host application.

use std::sync::Arc;

use crate::location::{
    Clock, LocationConfig, LocationProviders, LocationService, LocationSession, SessionSnapshot,
};

/// Core interface handed to the host application.
///
/// Owns the one [`LocationService`] of the application and a
/// [`LocationSession`] over it. Build it once at startup and call
/// [`shutdown`](Self::shutdown) when the app exits.
#[derive(Debug)]
pub struct HelpmeCore {
    location: LocationService,
    session: LocationSession,
}

impl HelpmeCore {
    /// Creates a core over the given platform providers.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use helpme_core::location::LocationConfig;
    /// use helpme_core::HelpmeCore;
    ///
    /// let core = HelpmeCore::new(providers, LocationConfig::from_env());
    /// let here = core.session().get_current_location().await;
    /// ```
    #[must_use]
    pub fn new(providers: LocationProviders, config: LocationConfig) -> Self {
        Self::from_service(LocationService::new(providers, config))
    }

    /// Creates a core with an explicit clock.
    #[must_use]
    pub fn with_clock(
        providers: LocationProviders,
        config: LocationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_service(LocationService::with_clock(providers, config, clock))
    }

    fn from_service(location: LocationService) -> Self {
        tracing::debug!(config = ?location.config(), "helpme core created");
        Self {
            session: LocationSession::new(location.clone()),
            location,
        }
    }

    /// Replaces the session with one restored from `snapshot`.
    pub async fn restore_session(&mut self, snapshot: SessionSnapshot) {
        self.session.close();
        self.session = LocationSession::restore(self.location.clone(), snapshot).await;
    }

    /// The shared location service.
    #[must_use]
    pub const fn location(&self) -> &LocationService {
        &self.location
    }

    /// The location session.
    #[must_use]
    pub const fn session(&self) -> &LocationSession {
        &self.session
    }

    /// Stops auto-updates and clears all cached location state.
    pub fn shutdown(&self) {
        self.session.close();
        self.location.cleanup();
        tracing::info!("helpme core shut down");
    }
}
