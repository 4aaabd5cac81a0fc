//! Ground SDK Module
//!
//! Narrow interface to the vehicle SDK (session, auto-connection facility,
//! devices and the flight plan piloting interface), plus an in-process
//! simulation of it.

pub mod sim;
mod traits;

pub use traits::{
    AssetSource, AutoConnection, Device, Drone, FlightPlanPilotingItf, GroundSession, Subscription,
};
