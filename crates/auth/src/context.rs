//! Cancellation carrier with per-operation deadlines.
//!
//! Every outbound call to a collaborator runs through [`CallContext::run`],
//! which races the call against the cancellation token and a fresh deadline.
//! The deadline restarts for each call, so sequential queries in one flow do
//! not share a single budget.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default deadline for database and side-channel operations.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for health probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    op_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum CallError<E: std::error::Error + 'static> {
    #[error("operation cancelled")]
    Cancelled,

    #[error("{op} exceeded its {after:?} deadline")]
    DeadlineExceeded { op: &'static str, after: Duration },

    #[error(transparent)]
    Failed(E),
}

impl CallContext {
    pub fn new(op_timeout: Duration) -> Self {
        Self::with_token(CancellationToken::new(), op_timeout)
    }

    pub fn with_token(cancel: CancellationToken, op_timeout: Duration) -> Self {
        Self { cancel, op_timeout }
    }

    /// Same cancellation token, different per-operation deadline.
    pub fn with_timeout(&self, op_timeout: Duration) -> Self {
        Self {
            cancel: self.cancel.clone(),
            op_timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one collaborator call under this context.
    pub async fn run<T, E, F>(&self, op: &'static str, fut: F) -> Result<T, CallError<E>>
    where
        E: std::error::Error + 'static,
        F: Future<Output = Result<T, E>>,
    {
        if self.cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CallError::Cancelled),
            res = tokio::time::timeout(self.op_timeout, fut) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(CallError::Failed(e)),
                Err(_) => Err(CallError::DeadlineExceeded {
                    op,
                    after: self.op_timeout,
                }),
            },
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(DEFAULT_OP_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[tokio::test]
    async fn passes_through_success_and_failure() {
        let ctx = CallContext::default();
        let ok: Result<u8, CallError<Boom>> = ctx.run("ok", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let failed: Result<u8, CallError<Boom>> = ctx.run("fail", async { Err(Boom) }).await;
        assert!(matches!(failed, Err(CallError::Failed(Boom))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_per_operation() {
        let ctx = CallContext::new(Duration::from_millis(100));
        let slow = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, Boom>(())
        };
        let res = ctx.run("slow", slow).await;
        assert!(matches!(res, Err(CallError::DeadlineExceeded { op: "slow", .. })));

        // A following call gets its own full budget.
        let quick = async {
            tokio::time::sleep(Duration::from_millis(90)).await;
            Ok::<_, Boom>(())
        };
        assert!(ctx.run("quick", quick).await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = CallContext::default();
        ctx.cancel();
        let res: Result<(), CallError<Boom>> = ctx.run("never", async { Ok(()) }).await;
        assert!(matches!(res, Err(CallError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_call() {
        let ctx = CallContext::default();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let pending = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Boom>(())
        };
        let res = ctx.run("pending", pending).await;
        assert!(matches!(res, Err(CallError::Cancelled)));
    }
}
