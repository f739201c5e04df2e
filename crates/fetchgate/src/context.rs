use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Clone, Debug, Eq, Error, PartialEq, miette::Diagnostic)]
pub enum ContextError {
    #[diagnostic(code(fetchgate::context::cancelled))]
    #[error("Fetch was cancelled before it could complete.")]
    Cancelled,

    #[diagnostic(code(fetchgate::context::deadline_exceeded))]
    #[error("Fetch exceeded its deadline and was aborted.")]
    DeadlineExceeded,
}

/// Cancellation and deadline state that travels with a single fetch.
/// Every blocking step (network, filesystem, subprocess) is expected to
/// observe it, so that a cancelled fetch aborts promptly instead of
/// running to completion.
#[derive(Clone, Debug, Default)]
pub struct FetchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that is cancelled whenever the provided token is.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Apply a timeout, relative to now. An existing earlier deadline wins.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;

        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Derive a context that is cancelled with its parent, but can also be
    /// cancelled on its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        trace!("Cancelling fetch context");

        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Synchronous checkpoint, used between filesystem syscalls.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }

        if self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            return Err(ContextError::DeadlineExceeded);
        }

        Ok(())
    }

    /// Drive the future to completion, unless the context is cancelled or
    /// its deadline passes first. The future is dropped in that case, which
    /// for child processes spawned with `kill_on_drop` terminates them.
    pub async fn run<F, T, E>(&self, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ContextError>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.token.cancelled() => Err(ContextError::Cancelled.into()),
            _ = deadline => Err(ContextError::DeadlineExceeded.into()),
            result = future => result,
        }
    }
}
