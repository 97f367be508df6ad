//! # presence-core
//!
//! Tracks whether a signed-in user is actively using the application and
//! degrades their shared presence status (Active → Break → Offline) through two
//! staged inactivity deadlines, while writing a rate-limited audit trail.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Background work runs on named
//!   `std::thread` workers that a host can opt out of (see [`PresenceTracker::manual_drive`]).
//! - **Single owner**: All mutable presence state lives behind one mutex inside
//!   [`PresenceScheduler`]; every other component goes through its public operations.
//! - **Best effort**: Collaborator calls run on their own effect lanes; failures are
//!   logged and swallowed. Tracking never waits on them or surfaces their errors.
//! - **Injectable**: Clock, input sources and collaborators are traits, so tests run
//!   against [`ManualClock`] and the in-memory collaborators.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use presence_core::{PresenceConfig, PresenceTracker, TrackerParts};
//!
//! let tracker = PresenceTracker::new(PresenceConfig::default(), parts);
//! tracker.initialize();
//! let stats = tracker.activity_stats();
//! ```

pub mod capture;
pub mod clock;
pub mod collaborators;
pub mod config;
mod dispatch;
pub mod error;
pub mod memory;
pub mod navigation;
pub mod scheduler;
pub mod throttle;
pub mod tracker;
pub mod transition;
pub mod types;
mod worker;

pub use capture::{
    InteractionCapture, InteractionEvent, InteractionHub, InteractionKind, InteractionListener,
    InteractionSource,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    AuditRecord, AuditSink, Collaborators, FilePresenceStore, JsonlAuditSink, Notice, Notifier,
    PresenceStore, TracingNotifier,
};
pub use config::{default_config_path, load_config, PresenceConfig, Timings};
pub use error::{CollaboratorError, PresenceError, Result};
pub use memory::{MemoryAuditSink, MemoryNotifier, MemoryPresenceStore};
pub use navigation::{LocationProvider, NavigationWatcher, SharedLocation};
pub use scheduler::PresenceScheduler;
pub use throttle::AuditThrottle;
pub use tracker::{PresenceTracker, TrackerParts};
pub use transition::{StatusCheck, TransitionHandler};
pub use types::*;
