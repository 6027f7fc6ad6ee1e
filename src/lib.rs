//! Lumen Session Agent - timed light-stimulus pupillometry engine.
//!
//! Runs a fixed-timeline PIPR protocol (baseline, light stimulus,
//! post-light recovery) against a networked pupil sensor or a
//! deterministic simulator, extracts windowed constriction and
//! recovery metrics, fuses them with an optional EEG attention feed
//! into an engagement score, and keeps a crash-safe longitudinal EMA
//! of scores on disk.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Lumen Session Agent                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌────────────┐   ┌─────────┐   ┌─────────┐  │
//! │  │  Source  │──▶│ Scheduler  │──▶│ Metrics │──▶│ Scoring │  │
//! │  │ (device/ │   │ (phases,   │   │ (PIPR   │   │ (fusion │  │
//! │  │  sim)    │   │  ticks)    │   │ windows)│   │  + EEG) │  │
//! │  └──────────┘   └─────┬──────┘   └─────────┘   └────┬────┘  │
//! │                       ▼                             ▼       │
//! │                 ┌───────────┐                 ┌──────────┐  │
//! │                 │ Event Bus │                 │   EMA    │  │
//! │                 │ (pub/sub) │                 │  Store   │  │
//! │                 └─────┬─────┘                 └──────────┘  │
//! │                       ▼                                     │
//! │                 HTTP gateway (/start, /next-event, ...)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod attention;
pub mod bus;
pub mod config;
pub mod context;
pub mod events;
pub mod server;
pub mod session;
pub mod source;
pub mod store;

// Re-export key types at crate root for convenience
pub use attention::{AttentionFeed, AttentionSample, SimulatedAttentionFeed};
pub use bus::{EventBus, Subscription, NEXT_EVENT_TIMEOUT};
pub use config::{AgentConfig, SessionConfig, SessionConfigError};
pub use context::SessionContext;
pub use events::{EngagementResult, Event, Metric, Phase, SessionResult, TickSnapshot};
pub use session::{run_acquisition, start_session, StartStatus, WindowMetrics};
pub use source::{DeviceSource, PupilSample, SampleSource, SimulatedSource};
pub use store::{EngagementRecord, EngagementStore, DEFAULT_EMA_ALPHA};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
