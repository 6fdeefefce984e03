//! Building-aware radio link-quality modeling and edge resource placement
//! for mobile-network simulations.
//!
//! The crate is driven by an external mobility simulator: once per discrete
//! timestep the driver hands every active UE's position to
//! [`NetworkEngine::step`], which recomputes line-of-sight, SNR, and
//! serving-cell association against the configured base stations and returns
//! a reporting snapshot. Service-function-chain deployment and teardown
//! arrive as discrete commands and reserve capacity on the stations' resource
//! pools atomically.
//!
//! ## Crate Organization
//!
//! - `engine`: the simulation core (geometry, propagation, association,
//!   resources, placement, and the driver facade)
//! - `common`: scene description (JSON) and engine parameters (TOML)
//! - `error`: the shared engine error type

pub mod common;
pub mod engine;
pub mod error;

pub use common::config::EngineConfig;
pub use common::scene::{Scene, load_scene};
pub use engine::NetworkEngine;
pub use engine::network::{DeploymentOutcome, StepReport, UePosition};
pub use engine::types::SfcRequest;
pub use error::{EngineError, Result};
