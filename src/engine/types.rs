//! Type definitions for the engine.
//!
//! Contains the data structures shared across components:
//! - Geometry primitives (points, 3D segments, world bounds, buildings)
//! - Radio endpoints (base stations, user equipment)
//! - Service function chain components (VNF kinds, VNFs, SFC requests)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::engine::propagation::{LinkQuality, TxParams};
use crate::engine::resources::{ResourcePool, ResourceVector};

/// Simple 2D point in world coordinates (meters).
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// 3D point: a 2D world position plus an altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Ground-plane projection of this point.
    pub fn xy(&self) -> Point {
        Point { x: self.x, y: self.y }
    }

    /// True if all three coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Straight 3D segment between a transmitter and a receiver.
#[derive(Debug, Clone, Copy)]
pub struct Segment3 {
    pub a: Point3,
    pub b: Point3,
}

/// Rectangular extent of the simulated area.
///
/// `top_left` must be componentwise strictly less than `bottom_right`
/// (enforced at scene validation). Queries outside these bounds indicate a
/// caller bug and are answered permissively rather than failing mid-run.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WorldBounds {
    #[serde(rename = "world_top_left")]
    pub top_left: Point,
    #[serde(rename = "world_bottom_right")]
    pub bottom_right: Point,
}

impl WorldBounds {
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.top_left.x && p.x <= self.bottom_right.x && p.y >= self.top_left.y && p.y <= self.bottom_right.y
    }
}

/// A building footprint with a flat roof at `height_m`.
///
/// The ring is an ordered sequence of vertices; the closing edge from the
/// last vertex back to the first is implicit. Rings are validated at scene
/// load to be simple (non-self-intersecting) with positive height, and are
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct Building {
    pub id: u32,
    pub ring: Vec<Point>,
    pub height_m: f64,
}

impl Building {
    /// Iterate the footprint edges, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (&Point, &Point)> {
        let n = self.ring.len();
        (0..n).map(move |i| (&self.ring[i], &self.ring[(i + 1) % n]))
    }
}

/// Kind of a mobile node, which implies its antenna height.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UeKind {
    Vehicle,
    Pedestrian,
}

/// User equipment: a mobile node whose position is written by the external
/// mobility driver once per timestep.
///
/// The engine owns only the derived link fields (`serving`, `link`); the
/// driver owns arrival, movement, and departure.
#[derive(Debug, Clone)]
pub struct Ue {
    pub id: String,
    pub kind: UeKind,
    pub position: Point,
    pub height_m: f64,
    /// Station selected by the most recent association pass, if any.
    pub serving: Option<u32>,
    /// Link quality computed by the most recent association pass.
    pub link: Option<LinkQuality>,
}

impl Ue {
    pub fn new(id: String, kind: UeKind, position: Point, height_m: f64) -> Self {
        Self {
            id,
            kind,
            position,
            height_m,
            serving: None,
            link: None,
        }
    }

    /// Antenna position in 3D.
    pub fn position3(&self) -> Point3 {
        Point3::new(self.position.x, self.position.y, self.height_m)
    }
}

/// A fixed gNB with finite compute, memory, and bandwidth capacity.
///
/// Created once from the scene configuration; only the resource pool and the
/// connected-UE set mutate afterwards.
#[derive(Debug, Clone)]
pub struct BaseStation {
    pub id: u32,
    pub position: Point,
    pub height_m: f64,
    pub tx: TxParams,
    pub pool: ResourcePool,
    pub connected_ues: HashSet<String>,
}

impl BaseStation {
    pub fn new(id: u32, position: Point, height_m: f64, tx: TxParams, capacity: ResourceVector) -> Self {
        Self {
            id,
            position,
            height_m,
            tx,
            pool: ResourcePool::new(capacity),
            connected_ues: HashSet::new(),
        }
    }

    /// Antenna position in 3D.
    pub fn position3(&self) -> Point3 {
        Point3::new(self.position.x, self.position.y, self.height_m)
    }
}

/// Closed set of virtual network function kinds.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VnfKind {
    Firewall,
    LoadBalancer,
    Nat,
    Dpi,
    Cache,
    Transcoder,
}

impl VnfKind {
    /// Default resource-requirement profile, used when a request omits
    /// explicit values. Resolved at request construction time.
    pub fn default_requirements(&self) -> ResourceVector {
        match self {
            VnfKind::Firewall => ResourceVector::new(2.0, 256.0, 100.0),
            VnfKind::LoadBalancer => ResourceVector::new(2.0, 512.0, 200.0),
            VnfKind::Nat => ResourceVector::new(1.0, 128.0, 150.0),
            VnfKind::Dpi => ResourceVector::new(4.0, 1024.0, 80.0),
            VnfKind::Cache => ResourceVector::new(2.0, 2048.0, 120.0),
            VnfKind::Transcoder => ResourceVector::new(8.0, 2048.0, 60.0),
        }
    }
}

/// A VNF instance with its resolved resource requirement.
///
/// The station hosting a placed VNF is recorded in the owning
/// [`Deployment`](crate::engine::placement::Deployment); an undeployed VNF has
/// no binding.
#[derive(Debug, Clone)]
pub struct Vnf {
    pub id: String,
    pub kind: VnfKind,
    pub requirements: ResourceVector,
}

/// An ordered chain of VNFs forming one end-to-end service.
///
/// The order defines traversal order for latency accounting. Aggregate
/// bandwidth is the chain's end-to-end traffic volume; every hosting station
/// must carry at least this much for its VNFs.
#[derive(Debug, Clone)]
pub struct ServiceFunctionChain {
    pub id: String,
    pub vnfs: Vec<Vnf>,
    pub bandwidth_mbps: f64,
    pub latency_budget_ms: f64,
}

/// One VNF of a deployment request. Omitted requirements fall back to the
/// kind's default profile.
#[derive(Debug, Deserialize, Clone)]
pub struct VnfSpec {
    pub id: String,
    pub kind: VnfKind,
    #[serde(default)]
    pub requirements: Option<ResourceVector>,
}

/// A deployment request as received from the external driver.
#[derive(Debug, Deserialize, Clone)]
pub struct SfcRequest {
    pub id: String,
    pub vnfs: Vec<VnfSpec>,
    pub bandwidth_mbps: f64,
    pub latency_budget_ms: f64,
}

impl SfcRequest {
    /// Resolve the request into a chain with concrete requirements.
    pub fn resolve(self) -> ServiceFunctionChain {
        let vnfs = self
            .vnfs
            .into_iter()
            .map(|spec| Vnf {
                requirements: spec.requirements.unwrap_or_else(|| spec.kind.default_requirements()),
                id: spec.id,
                kind: spec.kind,
            })
            .collect();
        ServiceFunctionChain {
            id: self.id,
            vnfs,
            bandwidth_mbps: self.bandwidth_mbps,
            latency_budget_ms: self.latency_budget_ms,
        }
    }
}
