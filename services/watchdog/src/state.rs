//! Application state shared across request handlers.

use std::sync::Arc;

use watchdog_reconcile::{ReconcileTarget, Reconciler};

/// Shared application state.
///
/// Built once at start-up and passed to handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    reconciler: Reconciler,
    target: ReconcileTarget,
}

impl AppState {
    pub fn new(reconciler: Reconciler, target: ReconcileTarget) -> Self {
        Self {
            inner: Arc::new(AppStateInner { reconciler, target }),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    /// Where every pass triggered through this server looks.
    pub fn target(&self) -> &ReconcileTarget {
        &self.inner.target
    }
}
