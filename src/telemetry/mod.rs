// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing infrastructure.
//!
//! Initialize once at startup:
//!
//! ```rust,ignore
//! use worktree_task::telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::for_verbosity(verbose))?;
//! ```
//!
//! Public async operations carry `#[instrument]` spans; per-session fields
//! (`session`, `reason`) are recorded as structured values, never formatted
//! into the message.

mod correlation;
mod init;

pub use correlation::CorrelationId;
pub use init::{init_telemetry, TelemetryConfig};
