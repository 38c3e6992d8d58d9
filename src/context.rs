//! Per-request cancellation.
//!
//! A [`RequestContext`] travels with every orchestrator call. Gateway calls and
//! store reads race against it so a caller that hangs up, or a request that
//! runs past its deadline, stops consuming gateway capacity.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped a piece of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Cancelled => f.write_str("request cancelled"),
            Interrupt::DeadlineExceeded => f.write_str("request deadline exceeded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// A context that is never interrupted unless [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Shares the deadline; cancelling the parent cancels the child but not
    /// the other way around.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Current interruption, if any.
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.token.is_cancelled() {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drives `fut` until it finishes or the context is interrupted, whichever
    /// comes first. An already-interrupted context never polls `fut`.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupt>
    where
        F: Future,
    {
        if let Some(interrupt) = self.interrupted() {
            return Err(interrupt);
        }

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(Interrupt::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(Interrupt::DeadlineExceeded),
                    out = fut => Ok(out),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(Interrupt::Cancelled),
                    out = fut => Ok(out),
                }
            }
        }
    }

    /// Cancellable sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_completes_when_not_interrupted() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn cancelled_context_never_polls_future() {
        let ctx = RequestContext::new();
        ctx.cancel();
        let result = ctx
            .run(async {
                panic!("should not run");
            })
            .await;
        assert_eq!(result, Err(Interrupt::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_slow_work() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let result = ctx.sleep(Duration::from_secs(5)).await;
        assert_eq!(result, Err(Interrupt::DeadlineExceeded));
    }

    #[tokio::test]
    async fn child_follows_parent_cancellation() {
        let parent = RequestContext::new();
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.interrupted(), Some(Interrupt::Cancelled));

        let parent = RequestContext::new();
        let child = parent.child();
        child.cancel();
        assert_eq!(parent.interrupted(), None);
    }
}
