//! Session lifecycle notifications.

/// Receives session lifecycle events from [`crate::SecureClient`].
///
/// Called synchronously on the task that detected the event; implementations
/// should hand off anything slow (navigation, UI updates) instead of doing it
/// inline.
pub trait SessionObserver: Send + Sync {
    /// The session could not be refreshed and all credentials were cleared.
    ///
    /// Fired after the store is cleared, at most once per failed refresh.
    fn on_session_expired(&self);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_session_expired(&self) {}
}
