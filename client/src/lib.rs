pub mod cli;
pub mod configuration;
pub mod error;
pub mod local;
pub mod reporter;
pub mod startup;
pub mod telemetry;
pub mod tunnel;
