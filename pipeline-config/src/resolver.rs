//! Memoized event handler resolution.
//!
//! The handler list is built once, on first access, and shared by every
//! later caller. Concurrent first callers block on the same cell so the
//! construction closure runs at most once; a failed construction leaves the
//! resolver unresolved and the error goes to the caller that triggered it.

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::events::{EventHandler, PipelineEvent};

/// Builds an explicit handler list, replacing the legacy token fallback.
pub type HandlerFactory = Arc<dyn Fn() -> ConfigResult<Vec<Arc<dyn EventHandler>>> + Send + Sync>;

/// Immutable, shared list of active handlers.
#[derive(Clone)]
pub struct ResolvedHandlers(Arc<[Arc<dyn EventHandler>]>);

impl ResolvedHandlers {
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|h| h.name()).collect()
    }

    /// True when both values come from the same resolution.
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Feeds one event to every handler. Failures are logged and counted,
    /// the remaining handlers still receive the event.
    pub fn dispatch(&self, event: &PipelineEvent) -> usize {
        let mut failures = 0;
        for handler in self.0.iter() {
            if let Err(e) = handler.handle_event(event) {
                warn!(handler = handler.name(), event = event.kind(), error = %e, "Event handler failed");
                failures += 1;
            }
        }
        failures
    }
}

impl From<Vec<Arc<dyn EventHandler>>> for ResolvedHandlers {
    fn from(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        Self(handlers.into())
    }
}

impl Deref for ResolvedHandlers {
    type Target = [Arc<dyn EventHandler>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ResolvedHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

pub struct EventHandlerResolver {
    cell: RwLock<Arc<OnceCell<ResolvedHandlers>>>,
}

impl EventHandlerResolver {
    pub fn new() -> Self {
        Self {
            cell: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// Returns the cached list, running `build` only if nothing is cached yet.
    pub fn resolve_with<F>(&self, build: F) -> ConfigResult<ResolvedHandlers>
    where
        F: FnOnce() -> ConfigResult<Vec<Arc<dyn EventHandler>>>,
    {
        let cell = self.cell.read().clone();

        cell.get_or_try_init(|| {
            let handlers = ResolvedHandlers::from(build()?);
            info!(handlers = ?handlers.names(), "Resolved event handlers");
            Ok::<_, ConfigError>(handlers)
        })
        .cloned()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.read().get().is_some()
    }

    /// Forgets the cached list so the next call resolves again.
    ///
    /// A build already in flight finishes into the discarded cell: its
    /// caller still gets that list, but it is not cached and the next
    /// caller builds again.
    pub fn reset(&self) {
        *self.cell.write() = Arc::new(OnceCell::new());
        debug!("Event handler cache reset");
    }
}

impl Default for EventHandlerResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHandlerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlerResolver")
            .field("resolved", &self.cell.read().get())
            .finish()
    }
}
