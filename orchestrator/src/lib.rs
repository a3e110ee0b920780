//! Shipwright Orchestrator Library
//!
//! Provisions a completed build artifact across GitHub, Supabase and Vercel
//! as a single resumable deploy operation, then verifies the result is
//! actually serving traffic.

pub mod config;
pub mod deploy;
pub mod errors;
pub mod exec;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod store;
pub mod utils;
