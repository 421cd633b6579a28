//! Application services layer.
//!
//! This module contains the business logic services that orchestrate
//! between the API layer and infrastructure (store/, events/).

pub mod content_library;
pub mod context;
pub mod push_bus;
pub mod schedule_evaluator;
pub mod screen_registry;
pub mod sync_engine;
pub mod sync_state_store;

pub use content_library::VideoLibrary;
pub use context::ContextEngine;
pub use push_bus::{PushBus, PushOutcome};
pub use schedule_evaluator::ScheduleEvaluator;
pub use screen_registry::{ConnectionGuard, ScreenRegistry, ScreenshotSlot};
pub use sync_engine::SyncEngine;
pub use sync_state_store::{SyncRun, SyncRunStore};
