//! Shared state threaded through pass execution.

use std::sync::Arc;

use crate::{analysis::AnalysisCache, events::EventLog};

/// Configuration switches consulted by passes.
#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Master switch for loop-level reference-count optimization. When off,
    /// the pass returns immediately with no side effects.
    pub enable_rc_loop_opts: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        PassOptions {
            enable_rc_loop_opts: true,
        }
    }
}

/// Execution context shared by all passes and all functions.
///
/// Holds the configuration, the analysis cache, and the event log the cache
/// records into. One context serves a whole pipeline run; per-function state
/// lives inside the cache, sharded by function id.
#[derive(Debug)]
pub struct OptContext {
    /// Configuration switches.
    pub options: PassOptions,
    /// The shared analysis cache.
    pub analyses: AnalysisCache,
    /// Structured record of what passes and the cache did.
    pub events: Arc<EventLog>,
}

impl OptContext {
    /// Creates a context with the given options and a fresh cache and log.
    #[must_use]
    pub fn new(options: PassOptions) -> Self {
        let events = Arc::new(EventLog::new());
        OptContext {
            options,
            analyses: AnalysisCache::new(Arc::clone(&events)),
            events,
        }
    }
}

impl Default for OptContext {
    fn default() -> Self {
        OptContext::new(PassOptions::default())
    }
}
