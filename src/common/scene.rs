//! Scene loading, parsing, and validation logic.
//!
//! The scene is the static description of the simulated area, loaded once at
//! initialization: building footprints with heights, base stations with
//! transmit parameters and resource capacities, and the world coordinate
//! bounds. After validation it is converted into the immutable geometry
//! store and the station set.

use anyhow::Context;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::engine::geometry::{GeometryStore, segments_intersect};
use crate::engine::propagation::TxParams;
use crate::engine::resources::ResourceVector;
use crate::engine::types::{BaseStation, Building, Point, WorldBounds};

/// Buildings without a configured height get a persistent random height in
/// this range, meters.
const MIN_ASSIGNED_BUILDING_HEIGHT_M: f64 = 10.0;
const MAX_ASSIGNED_BUILDING_HEIGHT_M: f64 = 50.0;

const MAX_STATIONS: usize = 10_000;
const MIN_TX_POWER_DBM: f64 = -50.0;
const MAX_TX_POWER_DBM: f64 = 50.0;

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// A building as described in the scene file.
#[derive(Debug, Deserialize, Clone)]
pub struct BuildingSpec {
    pub id: u32,
    /// Ordered footprint vertices. A ring that repeats its first vertex at
    /// the end is accepted and normalized to the implicit-closure form.
    pub ring: Vec<Point>,
    /// Roof height in meters. Omitted heights are assigned at load time.
    #[serde(default)]
    pub height: Option<f64>,
}

/// A base station as described in the scene file.
#[derive(Debug, Deserialize, Clone)]
pub struct StationSpec {
    pub id: u32,
    pub position: Point,
    /// Antenna height in meters.
    pub height: f64,
    #[serde(default)]
    pub tx_params: TxParams,
    pub resource_capacity: ResourceVector,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize)]
pub struct Scene {
    #[serde(flatten)]
    pub bounds: WorldBounds,
    #[serde(default)]
    pub buildings: Vec<BuildingSpec>,
    pub stations: Vec<StationSpec>,
}

impl Scene {
    /// Drop an explicit closing vertex from every ring so downstream code
    /// can rely on implicit closure.
    pub fn normalize(&mut self) {
        for building in &mut self.buildings {
            if building.ring.len() > 3 {
                if let (Some(first), Some(last)) = (building.ring.first().copied(), building.ring.last().copied()) {
                    if first == last {
                        building.ring.pop();
                        log::debug!("building {} ring closed explicitly; trailing vertex dropped", building.id);
                    }
                }
            }
        }
    }

    /// Convert the validated scene into the immutable geometry store and the
    /// station set. Buildings without a configured height get a persistent
    /// random one.
    pub fn into_world(self) -> (GeometryStore, Vec<BaseStation>) {
        let mut rng = rand::thread_rng();
        let mut assigned = 0usize;
        let buildings = self
            .buildings
            .into_iter()
            .map(|spec| {
                let height_m = spec.height.unwrap_or_else(|| {
                    assigned += 1;
                    rng.gen_range(MIN_ASSIGNED_BUILDING_HEIGHT_M..MAX_ASSIGNED_BUILDING_HEIGHT_M)
                });
                Building {
                    id: spec.id,
                    ring: spec.ring,
                    height_m,
                }
            })
            .collect();
        if assigned > 0 {
            log::info!("assigned random heights to {} buildings without one", assigned);
        }
        let stations = self
            .stations
            .into_iter()
            .map(|spec| BaseStation::new(spec.id, spec.position, spec.height, spec.tx_params, spec.resource_capacity))
            .collect();
        (GeometryStore::new(buildings, self.bounds), stations)
    }
}

/// Load, normalize, and validate a scene from a JSON file.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    let mut scene: Scene = serde_json::from_str(&data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(e.to_string()))?;

    scene.normalize();
    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;
    Ok(scene)
}

/// Validate scene configuration.
///
/// Rejects the malformed inputs that would otherwise surface as runtime
/// confusion mid-simulation: inverted world bounds, out-of-bounds or
/// duplicate stations, unrealistic transmit power, degenerate or
/// self-intersecting building rings, and non-positive heights.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    let tl = &scene.bounds.top_left;
    let br = &scene.bounds.bottom_right;
    if !(tl.x.is_finite() && tl.y.is_finite() && br.x.is_finite() && br.y.is_finite()) {
        return Err("World bounds must be finite".to_string());
    }
    if tl.x >= br.x || tl.y >= br.y {
        return Err(format!(
            "Invalid world bounds: top-left ({}, {}) must be strictly less than bottom-right ({}, {})",
            tl.x, tl.y, br.x, br.y
        ));
    }

    // Check station count
    if scene.stations.is_empty() {
        return Err("Scene must contain at least one station".to_string());
    }
    if scene.stations.len() > MAX_STATIONS {
        return Err(format!("Station count {} exceeds maximum of {}", scene.stations.len(), MAX_STATIONS));
    }

    // Check for duplicate station IDs
    let mut station_ids = HashSet::new();
    for station in &scene.stations {
        if !station_ids.insert(station.id) {
            return Err(format!("Duplicate station id found: {}", station.id));
        }
    }

    // Validate each station
    for station in &scene.stations {
        if !station.position.x.is_finite() || !station.position.y.is_finite() {
            return Err(format!("Station {} has a non-finite position", station.id));
        }
        if !scene.bounds.contains(&station.position) {
            return Err(format!(
                "Station {} position ({}, {}) lies outside the world bounds",
                station.id, station.position.x, station.position.y
            ));
        }
        if !(station.height.is_finite() && station.height > 0.0) {
            return Err(format!("Station {} height must be positive", station.id));
        }
        if station.tx_params.tx_power_dbm < MIN_TX_POWER_DBM || station.tx_params.tx_power_dbm > MAX_TX_POWER_DBM {
            return Err(format!(
                "Station {} tx power {} dBm outside realistic range ({} to {} dBm)",
                station.id, station.tx_params.tx_power_dbm, MIN_TX_POWER_DBM, MAX_TX_POWER_DBM
            ));
        }
        if !station.resource_capacity.is_valid() {
            return Err(format!("Station {} resource capacity must be finite and non-negative", station.id));
        }
    }

    // Check for duplicate building IDs
    let mut building_ids = HashSet::new();
    for building in &scene.buildings {
        if !building_ids.insert(building.id) {
            return Err(format!("Duplicate building id found: {}", building.id));
        }
    }

    // Validate each building
    for building in &scene.buildings {
        if building.ring.len() < 3 {
            return Err(format!("Building {} ring needs at least 3 vertices", building.id));
        }
        for vertex in &building.ring {
            if !vertex.x.is_finite() || !vertex.y.is_finite() {
                return Err(format!("Building {} has a non-finite vertex", building.id));
            }
            if !scene.bounds.contains(vertex) {
                return Err(format!("Building {} vertex ({}, {}) lies outside the world bounds", building.id, vertex.x, vertex.y));
            }
        }
        if let Some(height) = building.height {
            if !(height.is_finite() && height > 0.0) {
                return Err(format!("Building {} height must be positive", building.id));
            }
        }
        validate_simple_ring(building.id, &building.ring)?;
    }

    Ok(())
}

/// Reject self-intersecting rings: no two non-adjacent edges may intersect.
/// Adjacent edges share a vertex, so they are skipped; zero-length edges are
/// rejected outright.
fn validate_simple_ring(building_id: u32, ring: &[Point]) -> Result<(), String> {
    let n = ring.len();
    let edge = |i: usize| (&ring[i], &ring[(i + 1) % n]);

    for i in 0..n {
        let (a, b) = edge(i);
        if a == b {
            return Err(format!("Building {} ring has a zero-length edge at vertex {}", building_id, i));
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            let (a, b) = edge(i);
            let (c, d) = edge(j);
            if segments_intersect(a, b, c, d) {
                return Err(format!("Building {} ring is self-intersecting (edges {} and {})", building_id, i, j));
            }
        }
    }
    Ok(())
}
