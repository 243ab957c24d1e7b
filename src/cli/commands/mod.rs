//! CLI command implementations.

mod config;
mod doctor;
mod run;
mod status;

pub use config::run_config;
pub use doctor::run_doctor;
pub use run::{run_batch, RunOptions};
pub use status::run_status;
