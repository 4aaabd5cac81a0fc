//! Session Module
//!
//! This module handles:
//! - Observing the auto-connection facility of a ground session
//! - Binding and unbinding drone and remote control monitors as devices change
//! - Publishing the dashboard view and dispatching operator commands

mod binding;
mod coordinator;

pub use coordinator::{CoordinatorHandle, DashboardView, SessionCoordinator};
