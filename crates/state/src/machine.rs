use serde::{Deserialize, Serialize};

/// Generic lifecycle state shared by every entity type the state manager
/// governs. Distinct from `feedline_core::entities::{BatchStatus,
/// ArticleStatus}` -- those are the concrete DB-column vocabularies; this is
/// the state machine's own reduced view, with a `(entity_type, db value)`
/// mapping on either side (see `StateManager::map_db_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Created,
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Archived,
}

impl EntityState {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityState::Created => "created",
            EntityState::Pending => "pending",
            EntityState::Processing => "processing",
            EntityState::Completed => "completed",
            EntityState::Failed => "failed",
            EntityState::Cancelled => "cancelled",
            EntityState::Archived => "archived",
        }
    }
}

/// One edge in a state machine: `(from_state, trigger) -> to_state`.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from_state: EntityState,
    pub to_state: EntityState,
    pub trigger: &'static str,
}

impl StateTransition {
    pub const fn new(from_state: EntityState, trigger: &'static str, to_state: EntityState) -> Self {
        Self { from_state, to_state, trigger }
    }
}

/// Generic state machine for one entity type's lifecycle (spec.md §4.8).
pub struct StateMachine {
    pub entity_type: &'static str,
    transitions: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new(entity_type: &'static str, transitions: Vec<StateTransition>) -> Self {
        Self { entity_type, transitions }
    }

    pub fn get_transition(&self, current: EntityState, trigger: &str) -> Option<&StateTransition> {
        self.transitions.iter().find(|t| t.from_state == current && t.trigger == trigger)
    }

    pub fn can_transition(&self, current: EntityState, trigger: &str) -> bool {
        self.get_transition(current, trigger).is_some()
    }
}

/// `created -> pending (plan) -> processing (start) -> completed (complete)
/// | failed (fail) -> pending (retry) -> ... -> archived (archive)`;
/// `cancelled` reachable from `pending` or `processing` (spec.md §4.8).
pub fn batch_state_machine() -> StateMachine {
    use EntityState::*;
    StateMachine::new(
        "batch",
        vec![
            StateTransition::new(Created, "plan", Pending),
            StateTransition::new(Pending, "start", Processing),
            StateTransition::new(Processing, "complete", Completed),
            StateTransition::new(Processing, "fail", Failed),
            StateTransition::new(Failed, "retry", Pending),
            StateTransition::new(Completed, "archive", Archived),
            StateTransition::new(Pending, "cancel", Cancelled),
            StateTransition::new(Processing, "cancel", Cancelled),
        ],
    )
}

/// `created -> pending (queue) -> processing (process) -> processed
/// (complete) | failed (fail) -> pending (retry) -> ... -> archived`
/// (spec.md §4.8).
pub fn article_state_machine() -> StateMachine {
    use EntityState::*;
    StateMachine::new(
        "article",
        vec![
            StateTransition::new(Created, "queue", Pending),
            StateTransition::new(Pending, "process", Processing),
            StateTransition::new(Processing, "complete", Completed),
            StateTransition::new(Processing, "fail", Failed),
            StateTransition::new(Failed, "retry", Pending),
            StateTransition::new(Completed, "archive", Archived),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_plan_transition_is_valid() {
        let sm = batch_state_machine();
        assert!(sm.can_transition(EntityState::Created, "plan"));
        assert_eq!(sm.get_transition(EntityState::Created, "plan").unwrap().to_state, EntityState::Pending);
    }

    #[test]
    fn unknown_trigger_is_rejected() {
        let sm = batch_state_machine();
        assert!(!sm.can_transition(EntityState::Created, "complete"));
    }

    #[test]
    fn cancel_is_reachable_from_pending_and_processing() {
        let sm = batch_state_machine();
        assert!(sm.can_transition(EntityState::Pending, "cancel"));
        assert!(sm.can_transition(EntityState::Processing, "cancel"));
    }

    #[test]
    fn article_machine_has_no_cancel_edge() {
        let sm = article_state_machine();
        assert!(!sm.can_transition(EntityState::Pending, "cancel"));
    }
}
