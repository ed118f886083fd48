//! Correlation IDs shared by every log line of one ingestion attempt.

use std::cell::RefCell;
use uuid::Uuid;

/// Per-ingestion context with a correlation ID.
#[derive(Clone, Debug)]
pub struct CorrelationContext {
    correlation_id: String,
}

impl CorrelationContext {
    /// Creates a new context with a generated ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Creates a context with an existing ID.
    #[must_use]
    pub fn from_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
        }
    }

    /// Returns the correlation ID.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<CorrelationContext>> = const { RefCell::new(None) };
}

/// Guard that restores the previous thread-local context on drop.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct CorrelationGuard {
    previous: Option<CorrelationContext>,
}

impl Drop for CorrelationGuard {
    fn drop(&mut self) {
        THREAD_CONTEXT.with(|slot| {
            *slot.borrow_mut() = self.previous.take();
        });
    }
}

/// Enters a correlation context on the current thread.
pub fn enter_correlation_context(context: CorrelationContext) -> CorrelationGuard {
    let previous = THREAD_CONTEXT.with(|slot| slot.borrow_mut().replace(context));
    CorrelationGuard { previous }
}

/// Returns the current correlation ID, if set.
#[must_use]
pub fn current_correlation_id() -> Option<String> {
    THREAD_CONTEXT.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|ctx| ctx.correlation_id.clone())
    })
}
