use std::future::Future;

use tokio::task::AbortHandle;
use tracing::{Instrument, Span, debug, info, info_span};

use crate::live::Subscription;

enum Disposer {
    Subscription(Subscription),
    Task(AbortHandle),
}

/// Owns everything a screen starts, and releases it when the screen goes away.
///
/// Disposers run in reverse registration order on `close` or drop.
pub struct ScreenScope {
    name: &'static str,
    span: Span,
    disposers: Vec<Disposer>,
    closed: bool,
}

impl ScreenScope {
    pub fn new(name: &'static str) -> Self {
        let span = info_span!("screen", name);
        debug!(parent: &span, "Screen {} mounted", name);
        Self {
            name,
            span,
            disposers: Vec::new(),
            closed: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Cancel `subscription` when this scope closes.
    pub fn track(&mut self, subscription: Subscription) {
        self.disposers.push(Disposer::Subscription(subscription));
    }

    /// Run a screen task inside this scope's span; it is aborted on close.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task.instrument(self.span.clone()));
        self.disposers.push(Disposer::Task(handle.abort_handle()));
    }

    pub fn len(&self) -> usize {
        self.disposers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disposers.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let released = self.disposers.len();
        while let Some(disposer) = self.disposers.pop() {
            match disposer {
                Disposer::Subscription(s) => s.cancel(),
                Disposer::Task(t) => t.abort(),
            }
        }
        info!(parent: &self.span, "Screen {} closed ({} released)", self.name, released);
    }
}

impl Drop for ScreenScope {
    fn drop(&mut self) {
        self.close();
    }
}
