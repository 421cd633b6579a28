//! Marquee Core - shared library for the Marquee digital signage control
//! plane.
//!
//! This crate provides the server-side runtime: the screen registry and
//! push bus, the sync engine, the schedule evaluator, the context/mood
//! engine, and the tenant catalogue behind them. It is designed to be
//! used by the standalone headless server and by integration harnesses.
//!
//! # Architecture
//!
//! - [`model`]: persisted entities and the push envelope
//! - [`store`]: embedded relational catalogue (SQLite)
//! - [`events`]: typed screen-channel messages and the emitter seam
//! - [`services`]: registry, push bus, sync engine, schedules, context
//! - [`api`]: HTTP routes and the screen WebSocket channel
//! - [`bootstrap`]: composition root wiring everything together
//! - [`error`]: centralized error types
//!
//! # Abstraction seams
//!
//! The event channel per screen is hidden behind the registry's queue
//! handles, so the WebSocket transport in [`api`] could be swapped for
//! SSE or gRPC streams without touching the services. Domain events flow
//! through [`events::EventEmitter`], defaulting to a no-op in the
//! headless server.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod model;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

// Re-export commonly used types at the crate root
pub use api::{start_server, AppState, ServerError, TenantScope};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use error::{SignageError, SignageResult};
pub use events::{ClientMessage, EventEmitter, ServerMessage};
pub use model::{
    AlertLevel, Announcement, Client, Location, Playlist, PlaylistItem, PushEnvelope, PushKind,
    Schedule, Screen, ScreenMode, ScreenStatus, SyncGroup, SyncMode, BOOTSTRAP_TENANT,
};
pub use services::context::MoodVector;
pub use services::{PushBus, PushOutcome, ScreenRegistry, SyncEngine, SyncRun};
pub use state::{CollectorEndpoints, Config};
pub use store::{DashboardStats, ScreenFilter, Store};
pub use utils::now_millis;
