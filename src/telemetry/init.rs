// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup for the command line.

use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const CRATE_TARGET: &str = "worktree_task";

/// How much the supervisor says on stderr.
///
/// At normal verbosity only errors surface; capture and send failures stay
/// silent. `--verbose` raises this crate to `DEBUG` while dependencies stay at
/// `WARN`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level for this crate's own events.
    pub crate_level: Level,

    /// Level for everything else.
    pub dependency_level: Level,

    /// Log span close events with their timing.
    pub span_timing: bool,

    pub show_targets: bool,

    pub ansi: bool,

    /// Full filter directive replacing the two levels above.
    pub directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            crate_level: Level::ERROR,
            dependency_level: Level::ERROR,
            span_timing: false,
            show_targets: false,
            ansi: io::stderr().is_terminal(),
            directive: None,
        }
    }
}

impl TelemetryConfig {
    pub fn verbose() -> Self {
        Self {
            crate_level: Level::DEBUG,
            dependency_level: Level::WARN,
            span_timing: true,
            show_targets: true,
            ..Self::default()
        }
    }

    pub fn for_verbosity(verbose: bool) -> Self {
        if verbose {
            Self::verbose()
        } else {
            Self::default()
        }
    }

    pub fn with_crate_level(mut self, level: Level) -> Self {
        self.crate_level = level;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn filter_directive(&self) -> String {
        match &self.directive {
            Some(directive) => directive.clone(),
            None => format!(
                "{},{}={}",
                self.dependency_level, CRATE_TARGET, self.crate_level
            )
            .to_lowercase(),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.filter_directive()))
            .unwrap_or_else(|_| EnvFilter::new(Level::ERROR.to_string()))
    }
}

/// Install the global subscriber. Events go to stderr so report output on
/// stdout can be piped.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<()> {
    let span_events = if config.span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_target(config.show_targets)
        .with_span_events(span_events)
        .compact();

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .map_err(io::Error::other)
}
