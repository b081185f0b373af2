//! Corrective recreate for games whose initial content never completed.

use std::collections::HashSet;

use crate::dispatch::Command;
use crate::models::GameSnapshot;
use crate::status::ClientStatus;

/// Watches snapshots for a prompt with characters but no synopsis and asks for
/// a recreate, at most once per occurrence of that condition per game.
#[derive(Debug, Default)]
pub struct RecreationTrigger {
    in_flight: HashSet<String>,
}

impl RecreationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recreate command to issue, if any.
    ///
    /// `status` is the status after the snapshot has been reconciled. The
    /// caller moves to `recreating_inProgress` when a command is returned.
    pub fn evaluate(&mut self, status: ClientStatus, snapshot: &GameSnapshot) -> Option<Command> {
        if snapshot.has_synopsis() {
            if self.in_flight.remove(&snapshot.id) {
                tracing::debug!("Synopsis arrived for {}, recreate condition cleared", snapshot.id);
            }
            return None;
        }

        if !snapshot.has_prompt() || !snapshot.has_characters() {
            return None;
        }
        if status.is_recreating() || !Self::eligible(status) {
            return None;
        }
        if self.in_flight.contains(&snapshot.id) {
            tracing::debug!("Recreate already issued for {}", snapshot.id);
            return None;
        }

        tracing::info!(
            "Game {} has characters but no synopsis while {}, requesting recreate",
            snapshot.id,
            status
        );
        self.in_flight.insert(snapshot.id.clone());
        Some(Command::recreate(snapshot))
    }

    pub fn is_in_flight(&self, game_id: &str) -> bool {
        self.in_flight.contains(game_id)
    }

    fn eligible(status: ClientStatus) -> bool {
        matches!(
            status,
            ClientStatus::Idle
                | ClientStatus::CreatingAwaitingCharacters
                | ClientStatus::CreatingAwaitingSynopsis
                | ClientStatus::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Character;

    fn missing_synopsis() -> GameSnapshot {
        GameSnapshot::new("g1", "a haunted lighthouse")
            .with_characters(vec![Character::new("a", "Ada")])
    }

    #[test]
    fn test_fires_once_per_condition() {
        let mut trigger = RecreationTrigger::new();
        let snapshot = missing_synopsis();

        let command = trigger.evaluate(ClientStatus::Idle, &snapshot);
        assert_eq!(command, Some(Command::recreate(&snapshot)));

        // More snapshots before the first recreate resolves
        assert!(trigger.evaluate(ClientStatus::Idle, &snapshot).is_none());
        assert!(trigger
            .evaluate(ClientStatus::CreatingAwaitingSynopsis, &snapshot)
            .is_none());
        assert!(trigger.is_in_flight("g1"));
    }

    #[test]
    fn test_rearms_after_synopsis_arrives() {
        let mut trigger = RecreationTrigger::new();
        let snapshot = missing_synopsis();

        assert!(trigger.evaluate(ClientStatus::Failed, &snapshot).is_some());
        assert!(trigger
            .evaluate(ClientStatus::ReadyToStart, &snapshot.clone().with_synopsis("x"))
            .is_none());
        assert!(!trigger.is_in_flight("g1"));

        assert!(trigger.evaluate(ClientStatus::Failed, &snapshot).is_some());
    }

    #[test]
    fn test_never_fires_while_recreating() {
        let mut trigger = RecreationTrigger::new();
        let snapshot = missing_synopsis();

        for status in [
            ClientStatus::RecreatingInProgress,
            ClientStatus::RecreatingAwaitingData,
        ] {
            assert!(trigger.evaluate(status, &snapshot).is_none());
        }
        assert!(!trigger.is_in_flight("g1"));
    }

    #[test]
    fn test_ignores_ineligible_statuses_and_shapes() {
        let mut trigger = RecreationTrigger::new();

        for status in [
            ClientStatus::CreatingInProgress,
            ClientStatus::LoadingAwaitingData,
            ClientStatus::StartingAwaitingScene,
            ClientStatus::ReadyToStart,
            ClientStatus::Concluded,
        ] {
            assert!(trigger.evaluate(status, &missing_synopsis()).is_none());
        }

        let no_characters = GameSnapshot::new("g1", "a haunted lighthouse");
        assert!(trigger.evaluate(ClientStatus::Idle, &no_characters).is_none());

        let no_prompt = GameSnapshot::new("g1", "").with_characters(vec![Character::new("a", "Ada")]);
        assert!(trigger.evaluate(ClientStatus::Idle, &no_prompt).is_none());
    }

    #[test]
    fn test_tracks_games_independently() {
        let mut trigger = RecreationTrigger::new();
        let first = missing_synopsis();
        let mut second = missing_synopsis();
        second.id = "g2".to_string();

        assert!(trigger.evaluate(ClientStatus::Idle, &first).is_some());
        assert!(trigger.evaluate(ClientStatus::Idle, &second).is_some());
    }
}
