use tokio::time::{sleep, timeout};

use super::command::{Command, CommandReceipt};
use super::error::{DispatchError, OrchestratorError, TransientKind};
use super::orchestrator::Orchestrator;
use super::retry::RetryPolicy;

/// Sends commands to the orchestrator, retrying transient failures.
///
/// Dispatches are independent; a dispatcher can be shared behind an `Arc`
/// and used from concurrent tasks.
#[derive(Debug, Clone)]
pub struct CommandDispatcher<O> {
    orchestrator: O,
    policy: RetryPolicy,
}

impl<O: Orchestrator> CommandDispatcher<O> {
    pub fn new(orchestrator: O) -> Self {
        Self::with_policy(orchestrator, RetryPolicy::default())
    }

    pub fn with_policy(orchestrator: O, policy: RetryPolicy) -> Self {
        Self {
            orchestrator,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn orchestrator(&self) -> &O {
        &self.orchestrator
    }

    /// Dispatches one command.
    ///
    /// Only transient failures are retried. Anything else is returned on the
    /// attempt it happened without using up the retry budget.
    pub async fn dispatch(&self, command: &Command) -> Result<CommandReceipt, DispatchError> {
        let operation = command.kind().operation();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            let error = match self.attempt(command).await {
                Ok(receipt) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Dispatch succeeded after retry");
                    }
                    return Ok(receipt);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::warn!(operation, attempt, "Dispatch failed permanently: {error}");
                return Err(DispatchError::Permanent {
                    operation,
                    attempt,
                    source: error,
                });
            }

            if attempt >= max_attempts {
                tracing::error!(
                    operation,
                    attempts = attempt,
                    "Dispatch retries exhausted: {error}"
                );
                return Err(DispatchError::RetriesExhausted {
                    operation,
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.policy.delay(attempt - 1);
            tracing::warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Dispatch attempt failed, retrying: {error}"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, command: &Command) -> Result<CommandReceipt, OrchestratorError> {
        match self.policy.attempt_timeout {
            Some(limit) => match timeout(limit, self.orchestrator.execute(command)).await {
                Ok(result) => result,
                Err(_) => Err(OrchestratorError::transient(
                    TransientKind::TimedOut,
                    format!("no response within {}ms", limit.as_millis()),
                )),
            },
            None => self.orchestrator.execute(command).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::error::PermanentKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Orchestrator that replays scripted results, then repeats the fallback.
    struct ScriptedOrchestrator {
        script: Mutex<VecDeque<Result<CommandReceipt, OrchestratorError>>>,
        fallback: Result<CommandReceipt, OrchestratorError>,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedOrchestrator {
        fn new(
            script: Vec<Result<CommandReceipt, OrchestratorError>>,
            fallback: Result<CommandReceipt, OrchestratorError>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
                delay: None,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Orchestrator for ScriptedOrchestrator {
        async fn execute(&self, _command: &Command) -> Result<CommandReceipt, OrchestratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn receipt() -> CommandReceipt {
        CommandReceipt {
            id: "g1".to_string(),
        }
    }

    fn unavailable() -> OrchestratorError {
        OrchestratorError::transient(TransientKind::Unavailable, "503")
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
    }

    #[tokio::test]
    async fn test_always_transient_makes_four_attempts() {
        let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![], Err(unavailable())));
        let dispatcher = CommandDispatcher::with_policy(orchestrator.clone(), fast_policy());

        let err = dispatcher.dispatch(&Command::start("g1")).await.unwrap_err();

        assert_eq!(orchestrator.calls(), 4);
        match err {
            DispatchError::RetriesExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "start");
                assert_eq!(attempts, 4);
                assert_eq!(source, unavailable());
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let not_found = OrchestratorError::permanent(PermanentKind::NotFound, "no game g1");
        let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![], Err(not_found.clone())));
        let dispatcher = CommandDispatcher::with_policy(orchestrator.clone(), fast_policy());

        let err = dispatcher.dispatch(&Command::start("g1")).await.unwrap_err();

        assert_eq!(orchestrator.calls(), 1);
        assert_eq!(
            err,
            DispatchError::Permanent {
                operation: "start",
                attempt: 1,
                source: not_found,
            }
        );
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let orchestrator = Arc::new(ScriptedOrchestrator::new(
            vec![
                Err(unavailable()),
                Err(OrchestratorError::transient(
                    TransientKind::ConnectionReset,
                    "reset",
                )),
            ],
            Ok(receipt()),
        ));
        let dispatcher = CommandDispatcher::with_policy(orchestrator.clone(), fast_policy());

        let result = dispatcher.dispatch(&Command::start("g1")).await.unwrap();

        assert_eq!(result, receipt());
        assert_eq!(orchestrator.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_after_transient_keeps_attempt_number() {
        let orchestrator = Arc::new(ScriptedOrchestrator::new(
            vec![Err(unavailable())],
            Err(OrchestratorError::permanent(PermanentKind::Validation, "bad")),
        ));
        let dispatcher = CommandDispatcher::with_policy(orchestrator.clone(), fast_policy());

        let err = dispatcher.dispatch(&Command::start("g1")).await.unwrap_err();

        assert_eq!(err.attempts(), 2);
        assert_eq!(orchestrator.calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let mut scripted = ScriptedOrchestrator::new(vec![], Ok(receipt()));
        scripted.delay = Some(Duration::from_millis(200));
        let orchestrator = Arc::new(scripted);
        let policy = fast_policy()
            .with_max_retries(1)
            .with_attempt_timeout(Some(Duration::from_millis(10)));
        let dispatcher = CommandDispatcher::with_policy(orchestrator.clone(), policy);

        let err = dispatcher.dispatch(&Command::start("g1")).await.unwrap_err();

        assert_eq!(orchestrator.calls(), 2);
        assert!(matches!(
            err,
            DispatchError::RetriesExhausted {
                attempts: 2,
                source: OrchestratorError::Transient {
                    kind: TransientKind::TimedOut,
                    ..
                },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let orchestrator = Arc::new(ScriptedOrchestrator::new(vec![], Err(unavailable())));
        let dispatcher = CommandDispatcher::with_policy(orchestrator.clone(), RetryPolicy::none());

        let err = dispatcher.dispatch(&Command::start("g1")).await.unwrap_err();

        assert_eq!(orchestrator.calls(), 1);
        assert_eq!(err.attempts(), 1);
    }
}
