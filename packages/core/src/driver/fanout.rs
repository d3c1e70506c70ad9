//! Bounded concurrent dispatch for fleet operations
//!
//! One task per member, at most `max_concurrency` running at once, each under
//! its own timeout and a child of a shared cancellation token. A failing
//! member is logged and recorded; it never aborts its siblings.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Limits applied to every fleet fan-out
#[derive(Debug, Clone)]
pub struct FanOutPolicy {
    pub max_concurrency: usize,
    /// Upper bound for one member operation, including its state wait
    pub task_timeout: Duration,
    /// Upper bound for a member reaching Running/Stopped after start/stop
    pub member_state_timeout: Duration,
    /// Cancelling this stops every in-flight member task
    pub cancel: CancellationToken,
}

impl Default for FanOutPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            task_timeout: Duration::from_secs(900),
            member_state_timeout: Duration::from_secs(300),
            cancel: CancellationToken::new(),
        }
    }
}

/// Per-member outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub succeeded: Vec<String>,
    /// Member name and error message
    pub failed: Vec<(String, String)>,
    /// Members already in the requested state, or whose state was unknown
    pub skipped: Vec<String>,
}

impl FanOutReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl FanOutPolicy {
    /// Run `op` against every member and wait for all of them
    pub async fn dispatch<T, F, Fut, E>(
        &self,
        action: &str,
        members: Vec<(String, T)>,
        op: F,
    ) -> FanOutReport
    where
        T: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (name, member) in members {
            let work = op(member);
            let semaphore = semaphore.clone();
            let cancel = self.cancel.child_token();
            let timeout = self.task_timeout;

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (name, Err("dispatch closed".to_string())),
                    },
                    _ = cancel.cancelled() => return (name, Err("cancelled".to_string())),
                };

                let outcome = tokio::select! {
                    result = tokio::time::timeout(timeout, work) => match result {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
                    },
                    _ = cancel.cancelled() => Err("cancelled".to_string()),
                };
                (name, outcome)
            });
        }

        let mut report = FanOutReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!("{} succeeded on member {}", action, name);
                    report.succeeded.push(name);
                }
                Ok((name, Err(e))) => {
                    tracing::warn!("unable to {} member {}: {}", action, name, e);
                    report.failed.push((name, e));
                }
                Err(e) => {
                    tracing::warn!("{} task for a member did not complete: {}", action, e);
                    report.failed.push(("<unknown>".to_string(), e.to_string()));
                }
            }
        }

        report.succeeded.sort();
        report.failed.sort();
        report
    }
}
