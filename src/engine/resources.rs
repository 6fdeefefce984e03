//! Per-station resource accounting.
//!
//! A pool tracks capacity and current allocation across three dimensions
//! (CPU cores, memory, bandwidth). Reservation is all-or-nothing and the
//! invariant `allocated <= capacity` holds on every dimension at all times.
//! An under-release indicates double-release bookkeeping in the caller; the
//! pool fails fast and refuses all further traffic instead of continuing
//! with corrupted counters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance for floating-point capacity comparisons.
const RESOURCE_EPS: f64 = 1e-9;

/// One amount per resource dimension: requirement, capacity, or allocation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct ResourceVector {
    pub cpu_cores: f64,
    pub memory_mb: f64,
    pub bandwidth_mbps: f64,
}

impl ResourceVector {
    pub const ZERO: Self = Self {
        cpu_cores: 0.0,
        memory_mb: 0.0,
        bandwidth_mbps: 0.0,
    };

    pub fn new(cpu_cores: f64, memory_mb: f64, bandwidth_mbps: f64) -> Self {
        Self {
            cpu_cores,
            memory_mb,
            bandwidth_mbps,
        }
    }

    /// True when every component is a finite, non-negative amount.
    pub fn is_valid(&self) -> bool {
        [self.cpu_cores, self.memory_mb, self.bandwidth_mbps].iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// A resource dimension, used to report which counter an accounting
/// violation hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDimension {
    Cpu,
    Memory,
    Bandwidth,
}

impl fmt::Display for ResourceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceDimension::Cpu => write!(f, "cpu"),
            ResourceDimension::Memory => write!(f, "memory"),
            ResourceDimension::Bandwidth => write!(f, "bandwidth"),
        }
    }
}

/// Utilization snapshot in percent per dimension. Pure read; dimensions with
/// zero capacity report 0.
#[derive(Debug, Serialize, Clone, Copy)]
pub struct Utilization {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub bw_pct: f64,
}

/// Capacity and current allocation for one base station.
///
/// Mutated only through `try_reserve`/`release`; everything else is
/// read-only reporting.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    capacity: ResourceVector,
    allocated: ResourceVector,
    /// Set on the first accounting violation; a poisoned pool admits nothing.
    poisoned: Option<ResourceDimension>,
}

impl ResourcePool {
    pub fn new(capacity: ResourceVector) -> Self {
        Self {
            capacity,
            allocated: ResourceVector::ZERO,
            poisoned: None,
        }
    }

    pub fn capacity(&self) -> &ResourceVector {
        &self.capacity
    }

    pub fn allocated(&self) -> &ResourceVector {
        &self.allocated
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Read-only feasibility check: would `try_reserve` succeed right now?
    pub fn can_fit(&self, request: &ResourceVector) -> bool {
        self.poisoned.is_none()
            && request.is_valid()
            && self.allocated.cpu_cores + request.cpu_cores <= self.capacity.cpu_cores + RESOURCE_EPS
            && self.allocated.memory_mb + request.memory_mb <= self.capacity.memory_mb + RESOURCE_EPS
            && self.allocated.bandwidth_mbps + request.bandwidth_mbps <= self.capacity.bandwidth_mbps + RESOURCE_EPS
    }

    /// Reserve all three dimensions atomically. Returns false (and changes
    /// nothing) if any dimension lacks remaining capacity, the request is
    /// malformed, or the pool is poisoned.
    pub fn try_reserve(&mut self, request: &ResourceVector) -> bool {
        if !request.is_valid() {
            log::warn!("rejecting malformed reservation request: {:?}", request);
            return false;
        }
        if !self.can_fit(request) {
            return false;
        }
        self.allocated.cpu_cores += request.cpu_cores;
        self.allocated.memory_mb += request.memory_mb;
        self.allocated.bandwidth_mbps += request.bandwidth_mbps;
        true
    }

    /// Return previously reserved capacity.
    ///
    /// Driving any dimension below zero is a double-release: the pool is
    /// poisoned and the offending dimension returned, leaving all counters
    /// untouched.
    pub fn release(&mut self, request: &ResourceVector) -> Result<(), ResourceDimension> {
        if let Some(dimension) = self.poisoned {
            return Err(dimension);
        }
        let checks = [
            (ResourceDimension::Cpu, self.allocated.cpu_cores - request.cpu_cores),
            (ResourceDimension::Memory, self.allocated.memory_mb - request.memory_mb),
            (ResourceDimension::Bandwidth, self.allocated.bandwidth_mbps - request.bandwidth_mbps),
        ];
        for (dimension, remaining) in checks {
            if remaining < -RESOURCE_EPS {
                log::error!("release of unallocated {} detected; halting pool", dimension);
                self.poisoned = Some(dimension);
                return Err(dimension);
            }
        }
        self.allocated.cpu_cores = (self.allocated.cpu_cores - request.cpu_cores).max(0.0);
        self.allocated.memory_mb = (self.allocated.memory_mb - request.memory_mb).max(0.0);
        self.allocated.bandwidth_mbps = (self.allocated.bandwidth_mbps - request.bandwidth_mbps).max(0.0);
        Ok(())
    }

    /// Current utilization in percent per dimension.
    pub fn utilization(&self) -> Utilization {
        fn pct(allocated: f64, capacity: f64) -> f64 {
            if capacity > 0.0 { 100.0 * allocated / capacity } else { 0.0 }
        }
        Utilization {
            cpu_pct: pct(self.allocated.cpu_cores, self.capacity.cpu_cores),
            mem_pct: pct(self.allocated.memory_mb, self.capacity.memory_mb),
            bw_pct: pct(self.allocated.bandwidth_mbps, self.capacity.bandwidth_mbps),
        }
    }

    /// Highest utilization across the three dimensions, used for
    /// load-balancing comparisons.
    pub fn max_utilization_pct(&self) -> f64 {
        let u = self.utilization();
        u.cpu_pct.max(u.mem_pct).max(u.bw_pct)
    }
}
