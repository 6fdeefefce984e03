//! Engine error type shared across all components.
//!
//! Placement rejections (`InsufficientResources`, `LatencyBudgetExceeded`) are
//! normal, recoverable outcomes surfaced to the caller; the simulation
//! continues. `PoolAccounting` is not: it indicates an engine bug and halts
//! further traffic on the affected pool.

use thiserror::Error;

use crate::engine::resources::ResourceDimension;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Non-finite coordinates reached a link-quality or step computation.
    /// Caller bug; the request is not retried.
    #[error("invalid geometry: {what}")]
    InvalidGeometry { what: String },

    /// No station can host one of the chain's VNFs. All reservations made for
    /// the chain have been rolled back.
    #[error("no feasible placement for VNF '{vnf_id}' of SFC '{sfc_id}'")]
    InsufficientResources { sfc_id: String, vnf_id: String },

    /// A resource-feasible placement exists but violates the chain's latency
    /// budget. All reservations made for the chain have been rolled back.
    #[error("SFC '{sfc_id}' estimated latency {estimated_ms:.2} ms exceeds budget {budget_ms:.2} ms")]
    LatencyBudgetExceeded {
        sfc_id: String,
        estimated_ms: f64,
        budget_ms: f64,
    },

    /// Second teardown of the same deployment. Pool counters are untouched.
    #[error("SFC '{sfc_id}' has already been torn down")]
    AlreadyTornDown { sfc_id: String },

    /// Deployment request with an empty VNF chain.
    #[error("SFC '{sfc_id}' contains no VNFs")]
    EmptyChain { sfc_id: String },

    /// Deployment request reusing the id of a live deployment.
    #[error("an SFC with id '{sfc_id}' is already deployed")]
    DuplicateSfc { sfc_id: String },

    /// Command referencing an SFC the engine has never deployed.
    #[error("no deployment found for SFC '{sfc_id}'")]
    UnknownSfc { sfc_id: String },

    /// Command referencing a station that is not part of the configuration.
    #[error("no station with id {station_id}")]
    UnknownStation { station_id: u32 },

    /// Releasing more than was allocated on a pool dimension. Fatal for the
    /// pool: it is poisoned and refuses further reservations.
    #[error("resource accounting violation on station {station_id} ({dimension}); pool halted")]
    PoolAccounting {
        station_id: u32,
        dimension: ResourceDimension,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
