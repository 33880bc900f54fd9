pub mod alerts;
pub mod health;
pub mod samples;
pub mod snapshot;
pub mod stats;
pub mod targets;
