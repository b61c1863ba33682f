pub mod error;
pub mod machine;
pub mod manager;

pub use error::StateError;
pub use machine::{article_state_machine, batch_state_machine, EntityState, StateMachine, StateTransition};
pub use manager::{StateManager, TransitionLogEntry};
