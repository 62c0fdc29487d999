//! Space-weather monitoring core.
//!
//! Fetches NOAA SWPC and NASA DONKI feeds on an external cadence, derives
//! a snapshot of current conditions, emits deduplicated urgency-classified
//! alerts, persists state atomically under a single-writer lock, and
//! verifies user prognostics against what actually happened.

pub mod baserate;
pub mod config;
pub mod evaluate;
pub mod fetch;
pub mod filter;
pub mod lock;
pub mod logs;
pub mod model;
pub mod pipeline;
pub mod predict;
pub mod snapshot;
pub mod state;
pub mod view;

pub use config::CheckerConfig;
pub use pipeline::{Checker, TickSummary};
