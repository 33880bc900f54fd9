//! Per-target monitoring pipeline
//!
//! A unit of work for one target runs these in order: [`session`] runs the
//! probes, [`parser`] turns their output into a sample, [`resources`]
//! raises threshold alerts and [`status`] records the outcome.

pub mod parser;
pub mod resources;
pub mod session;
pub mod ssh;
pub mod status;
