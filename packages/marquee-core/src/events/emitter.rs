//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete
//! channels, enabling testing and alternative delivery paths.

use super::{RegistryEvent, ScheduleEvent, SyncEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Services use this to surface lifecycle events; the screen-facing fan-out
/// happens separately through the registry's connected-screen channels.
pub trait EventEmitter: Send + Sync {
    /// Emits a registry lifecycle event.
    fn emit_registry(&self, event: RegistryEvent);

    /// Emits a sync engine lifecycle event.
    fn emit_sync(&self, event: SyncEvent);

    /// Emits a schedule evaluator decision.
    fn emit_schedule(&self, event: ScheduleEvent);
}

/// No-op emitter for the headless server or testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_registry(&self, _event: RegistryEvent) {}

    fn emit_sync(&self, _event: SyncEvent) {}

    fn emit_schedule(&self, _event: ScheduleEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_registry(&self, event: RegistryEvent) {
        tracing::debug!(?event, "registry_event");
    }

    fn emit_sync(&self, event: SyncEvent) {
        tracing::debug!(?event, "sync_event");
    }

    fn emit_schedule(&self, event: ScheduleEvent) {
        tracing::debug!(?event, "schedule_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    pub(crate) struct CountingEventEmitter {
        registry_count: AtomicUsize,
        sync_count: AtomicUsize,
    }

    impl CountingEventEmitter {
        fn new() -> Self {
            Self {
                registry_count: AtomicUsize::new(0),
                sync_count: AtomicUsize::new(0),
            }
        }
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_registry(&self, _event: RegistryEvent) {
            self.registry_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_sync(&self, _event: SyncEvent) {
            self.sync_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_schedule(&self, _event: ScheduleEvent) {}
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter::new());

        emitter.emit_registry(RegistryEvent::ScreenConnected {
            screen_id: "scr-1".to_string(),
            timestamp: 0,
        });
        emitter.emit_registry(RegistryEvent::ScreenOffline {
            screen_id: "scr-1".to_string(),
            timestamp: 0,
        });
        emitter.emit_sync(SyncEvent::Stopped {
            group_id: "g1".to_string(),
            timestamp: 0,
        });

        assert_eq!(emitter.registry_count.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.sync_count.load(Ordering::SeqCst), 1);
    }
}
