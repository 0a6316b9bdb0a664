//! # Compensation Stack
//!
//! Checkout is a sequence of mutations against independent resources, so a
//! failure partway through must undo what already happened. Each completed
//! step pushes its compensating action here; the first failure unwinds the
//! stack newest-first. On success the stack is simply dropped.

use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

type Undo = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Reverse-order compensation stack
#[derive(Default)]
pub struct Compensations {
    steps: Vec<(&'static str, Undo)>,
}

impl Compensations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the undo action for a step that just completed.
    /// The future must be infallible from the caller's point of view;
    /// anything that can fail should log and swallow its own error.
    pub fn push(&mut self, label: &'static str, undo: impl Future<Output = ()> + Send + 'static) {
        self.steps.push((label, Box::pin(undo)));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every registered compensation, newest first
    pub async fn unwind(mut self) {
        if self.steps.is_empty() {
            return;
        }
        warn!(steps = self.steps.len(), "unwinding checkout compensations");
        while let Some((label, undo)) = self.steps.pop() {
            debug!(step = label, "compensating");
            undo.await;
        }
    }
}
