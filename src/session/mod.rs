//! Session engine: phase scheduling, windowed metric extraction and
//! score fusion.

pub mod metrics;
pub mod scheduler;
pub mod scoring;

pub use metrics::WindowMetrics;
pub use scheduler::{run_acquisition, start_session, StartStatus};
