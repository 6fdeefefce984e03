//! Radio-propagation and edge-placement engine core.
//!
//! This module provides the complete per-timestep machinery for a mobile
//! network simulation. It integrates:
//! - 3D building-aware line-of-sight and SNR computation
//! - Per-UE serving-cell association with handover hysteresis
//! - Per-station resource pools with atomic admission
//! - Greedy service-function-chain placement with rollback
//!
//! ## Module Organization
//!
//! - `types`: Core data structures (buildings, stations, UEs, VNFs, SFCs)
//! - `geometry`: Line-of-sight obstruction and Fresnel-zone intrusion logic
//! - `propagation`: Path loss, diffraction, and SNR calculations
//! - `association`: Serving-cell selection policy
//! - `resources`: Per-station capacity accounting
//! - `placement`: SFC deployment and teardown
//! - `network`: The driver-facing engine facade
//!
//! ## Public API
//!
//! The main entry point is `network::NetworkEngine`, stepped once per
//! simulation timestep by the external mobility driver.

pub mod association;
pub mod geometry;
pub mod network;
pub mod placement;
pub mod propagation;
pub mod resources;
pub mod types;

// Re-export the driver facade for convenience
pub use network::NetworkEngine;

// Re-export commonly used types
pub use propagation::LinkQuality;
pub use types::{BaseStation, Point, Ue, UeKind};
