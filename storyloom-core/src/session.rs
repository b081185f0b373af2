//! Viewer-side driver for one game.
//!
//! A [`GameSession`] feeds push-channel frames through the [`Reconciler`],
//! lets the [`RecreationTrigger`] look at every new snapshot, and sends user
//! and corrective commands through a shared [`CommandDispatcher`].

use std::sync::Arc;

use crate::dispatch::{
    Command, CommandDispatcher, CommandKind, CommandReceipt, DispatchError, Orchestrator,
};
use crate::models::GameSnapshot;
use crate::reconcile::{Applied, ReconcileError, Reconciler};
use crate::recreate::RecreationTrigger;
use crate::status::ClientStatus;

/// What happened while handling one frame.
#[derive(Debug)]
pub struct FrameOutcome {
    pub applied: Applied,
    /// Result of the recreate issued because of this frame, if one was
    pub recreate: Option<Result<CommandReceipt, DispatchError>>,
}

pub struct GameSession<O> {
    game_id: Option<String>,
    reconciler: Reconciler,
    trigger: RecreationTrigger,
    dispatcher: Arc<CommandDispatcher<O>>,
}

impl<O: Orchestrator> GameSession<O> {
    /// Session for a game that does not exist yet; `submit` a create next.
    pub fn new(dispatcher: Arc<CommandDispatcher<O>>) -> Self {
        Self {
            game_id: None,
            reconciler: Reconciler::new(),
            trigger: RecreationTrigger::new(),
            dispatcher,
        }
    }

    /// Session for an existing game, waiting for its first snapshot.
    pub fn open(game_id: impl Into<String>, dispatcher: Arc<CommandDispatcher<O>>) -> Self {
        Self {
            game_id: Some(game_id.into()),
            reconciler: Reconciler::with_status(ClientStatus::LoadingAwaitingData),
            trigger: RecreationTrigger::new(),
            dispatcher,
        }
    }

    pub fn game_id(&self) -> Option<&str> {
        self.game_id.as_deref()
    }

    pub fn status(&self) -> ClientStatus {
        self.reconciler.status()
    }

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.reconciler.snapshot()
    }

    pub fn message(&self) -> Option<&str> {
        self.reconciler.message()
    }

    /// Sends a user command, pre-setting the matching in-progress status.
    pub async fn submit(&mut self, command: Command) -> Result<CommandReceipt, DispatchError> {
        self.reconciler
            .begin(ClientStatus::for_command(command.kind(), command.is_recreate()));

        match self.dispatcher.dispatch(&command).await {
            Ok(receipt) => {
                if command.kind() == CommandKind::Create && self.game_id.is_none() {
                    self.game_id = Some(receipt.id.clone());
                }
                self.reconciler.acknowledge();
                Ok(receipt)
            }
            Err(e) => {
                self.reconciler.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Handles one text frame from the push channel.
    pub async fn on_frame(&mut self, text: &str) -> Result<FrameOutcome, ReconcileError> {
        let applied = self.reconciler.apply_frame(text)?;
        if matches!(applied, Applied::Stale { .. }) {
            return Ok(FrameOutcome {
                applied,
                recreate: None,
            });
        }

        let command = match self.reconciler.snapshot() {
            Some(snapshot) => self.trigger.evaluate(self.reconciler.status(), snapshot),
            None => None,
        };

        let recreate = match command {
            Some(command) => Some(self.submit(command).await),
            None => None,
        };

        Ok(FrameOutcome { applied, recreate })
    }

    /// The push channel closed; returns the failure message if it matters.
    pub fn on_transport_closed(&mut self) -> Option<String> {
        self.reconciler.on_transport_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{OrchestratorError, PermanentKind, RetryPolicy, TransientKind};
    use crate::models::Character;
    use crate::protocol::{SequenceToken, ServerFrame};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every command and answers with a fixed result.
    struct RecordingOrchestrator {
        commands: Mutex<Vec<Command>>,
        result: Result<CommandReceipt, OrchestratorError>,
    }

    impl RecordingOrchestrator {
        fn ok() -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                result: Ok(CommandReceipt {
                    id: "g1".to_string(),
                }),
            }
        }

        fn failing(error: OrchestratorError) -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                result: Err(error),
            }
        }

        fn commands(&self) -> Vec<Command> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Orchestrator for RecordingOrchestrator {
        async fn execute(&self, command: &Command) -> Result<CommandReceipt, OrchestratorError> {
            self.commands.lock().unwrap().push(command.clone());
            self.result.clone()
        }
    }

    fn dispatcher(
        orchestrator: Arc<RecordingOrchestrator>,
    ) -> Arc<CommandDispatcher<Arc<RecordingOrchestrator>>> {
        Arc::new(CommandDispatcher::with_policy(
            orchestrator,
            RetryPolicy::none(),
        ))
    }

    fn frame(sequence: i64, snapshot: GameSnapshot) -> String {
        ServerFrame::snapshot(SequenceToken::new(sequence), snapshot)
            .encode()
            .unwrap()
    }

    fn missing_synopsis() -> GameSnapshot {
        GameSnapshot::new("g1", "a haunted lighthouse")
            .with_characters(vec![Character::new("a", "Ada")])
    }

    #[tokio::test]
    async fn test_create_sets_game_id_and_status() {
        let orchestrator = Arc::new(RecordingOrchestrator::ok());
        let mut session = GameSession::new(dispatcher(orchestrator.clone()));

        let receipt = session
            .submit(Command::create("a haunted lighthouse", vec![]))
            .await
            .unwrap();

        assert_eq!(receipt.id, "g1");
        assert_eq!(session.game_id(), Some("g1"));
        assert_eq!(session.status(), ClientStatus::CreatingInProgress);
    }

    #[tokio::test]
    async fn test_start_is_acknowledged() {
        let orchestrator = Arc::new(RecordingOrchestrator::ok());
        let mut session = GameSession::open("g1", dispatcher(orchestrator));

        session.submit(Command::start("g1")).await.unwrap();

        assert_eq!(session.status(), ClientStatus::StartingAwaitingScene);
    }

    #[tokio::test]
    async fn test_failed_dispatch_moves_to_failed() {
        let orchestrator = Arc::new(RecordingOrchestrator::failing(
            OrchestratorError::permanent(PermanentKind::NotFound, "no such game"),
        ));
        let mut session = GameSession::open("g1", dispatcher(orchestrator));

        assert!(session.submit(Command::start("g1")).await.is_err());
        assert_eq!(session.status(), ClientStatus::Failed);
        assert!(session.message().unwrap().contains("no such game"));
    }

    #[tokio::test]
    async fn test_missing_synopsis_triggers_single_recreate() {
        let orchestrator = Arc::new(RecordingOrchestrator::ok());
        let mut session = GameSession::open("g1", dispatcher(orchestrator.clone()));

        let outcome = session.on_frame(&frame(1, missing_synopsis())).await.unwrap();
        assert!(matches!(outcome.recreate, Some(Ok(_))));
        assert_eq!(session.status(), ClientStatus::RecreatingAwaitingData);

        // The orchestrator rewrites the record; more incomplete snapshots arrive
        session.on_frame(&frame(2, missing_synopsis())).await.unwrap();
        session.on_frame(&frame(3, missing_synopsis())).await.unwrap();

        let commands = orchestrator.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].is_recreate());
        assert_eq!(commands[0].target_id(), Some("g1"));

        let complete = missing_synopsis().with_synopsis("x");
        session.on_frame(&frame(4, complete)).await.unwrap();
        assert_eq!(session.status(), ClientStatus::ReadyToStart);
    }

    #[tokio::test]
    async fn test_failed_recreate_is_not_repeated() {
        let orchestrator = Arc::new(RecordingOrchestrator::failing(
            OrchestratorError::transient(TransientKind::Unavailable, "503"),
        ));
        let mut session = GameSession::open("g1", dispatcher(orchestrator.clone()));

        let outcome = session.on_frame(&frame(1, missing_synopsis())).await.unwrap();
        assert!(matches!(outcome.recreate, Some(Err(_))));
        assert_eq!(session.status(), ClientStatus::Failed);

        session.on_frame(&frame(2, missing_synopsis())).await.unwrap();
        assert_eq!(orchestrator.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_frame_is_ignored() {
        let orchestrator = Arc::new(RecordingOrchestrator::ok());
        let mut session = GameSession::open("g1", dispatcher(orchestrator.clone()));
        let complete = missing_synopsis().with_synopsis("x");

        session.on_frame(&frame(5, complete)).await.unwrap();
        let outcome = session.on_frame(&frame(4, missing_synopsis())).await.unwrap();

        assert!(matches!(outcome.applied, Applied::Stale { .. }));
        assert!(outcome.recreate.is_none());
        assert!(orchestrator.commands().is_empty());
        assert_eq!(session.status(), ClientStatus::ReadyToStart);
    }

    #[tokio::test]
    async fn test_transport_close_while_loading_fails() {
        let orchestrator = Arc::new(RecordingOrchestrator::ok());
        let mut session = GameSession::open("g1", dispatcher(orchestrator));

        assert!(session.on_transport_closed().is_some());
        assert_eq!(session.status(), ClientStatus::Failed);
    }
}
