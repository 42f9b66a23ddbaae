// ABOUTME: Library root for shipwright - environment promotion, deployment, and rollback.
// ABOUTME: The main binary is in main.rs; DeploymentManager is the entry point for embedding.

pub mod audit;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod notify;
pub mod output;
pub mod promotion;
pub mod rollback;
mod state_lock;
pub mod types;
pub mod validate;
