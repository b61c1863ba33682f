pub mod error;
pub mod feedhealth_job;
pub mod health;
pub mod router;
pub mod rpc;
pub mod startup;
pub mod state;

pub use error::ServerError;
pub use router::build_router;
pub use startup::{build_app_state, spawn_background_tasks};
pub use state::AppState;
