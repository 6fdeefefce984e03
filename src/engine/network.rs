//! Network engine: the per-timestep driver facade.
//!
//! Owns the station set, the UE registry, and the live deployments. One call
//! to `step` per simulation timestep: the driver hands over every active
//! UE's position, the engine syncs its registry, recomputes every
//! association, and returns the reporting snapshot. SFC deployment and
//! teardown arrive as discrete commands, independent of the timestep clock,
//! and are processed synchronously.
//!
//! Within a timestep all associations are recomputed before any placement
//! decision reads them; a step validates its whole input before mutating
//! anything, so a failed step leaves no partial state behind.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::common::config::EngineConfig;
use crate::common::scene::Scene;
use crate::engine::association;
use crate::engine::geometry::GeometryStore;
use crate::engine::placement::{self, Deployment};
use crate::engine::propagation::LinkQuality;
use crate::engine::types::{BaseStation, Point, SfcRequest, Ue, UeKind};
use crate::error::{EngineError, Result};

/// One UE's position for the current timestep, as supplied by the external
/// mobility driver. Presence in the step input defines the active set.
#[derive(Debug, Deserialize, Clone)]
pub struct UePosition {
    pub id: String,
    pub kind: UeKind,
    pub x: f64,
    pub y: f64,
}

/// Per-UE link record of one timestep.
#[derive(Debug, Serialize, Clone)]
pub struct UeLinkRecord {
    pub ue_id: String,
    pub serving_cell: Option<u32>,
    pub snr_db: f64,
    pub los: bool,
}

/// Per-station load record of one timestep.
#[derive(Debug, Serialize, Clone)]
pub struct StationLoadRecord {
    pub station_id: u32,
    pub connected_ue_count: usize,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub bw_pct: f64,
}

/// Snapshot produced by one completed timestep, consumed by the external
/// logger.
#[derive(Debug, Serialize, Clone)]
pub struct StepReport {
    pub timestep: u64,
    pub ues: Vec<UeLinkRecord>,
    pub stations: Vec<StationLoadRecord>,
}

/// Result of one deployment attempt, consumed by the external logger.
#[derive(Debug, Serialize, Clone)]
pub struct DeploymentOutcome {
    pub sfc_id: String,
    pub accepted: bool,
    pub reason: Option<String>,
    /// Hosting stations in chain order; empty on rejection.
    pub bound_stations: Vec<u32>,
}

/// The complete engine state driven by the external stepping loop.
pub struct NetworkEngine {
    geometry: GeometryStore,
    config: EngineConfig,
    stations: Vec<BaseStation>,
    ues: BTreeMap<String, Ue>,
    /// Live and torn-down deployments by SFC id. Torn-down entries stay as
    /// tombstones so a double teardown is detected rather than reported as
    /// unknown.
    deployments: HashMap<String, Deployment>,
    timestep: u64,
}

impl NetworkEngine {
    pub fn new(geometry: GeometryStore, stations: Vec<BaseStation>, config: EngineConfig) -> Self {
        Self {
            geometry,
            config,
            stations,
            ues: BTreeMap::new(),
            deployments: HashMap::new(),
            timestep: 0,
        }
    }

    /// Build the engine from a validated scene and engine parameters.
    pub fn from_scene(scene: Scene, config: EngineConfig) -> Self {
        let (geometry, stations) = scene.into_world();
        Self::new(geometry, stations, config)
    }

    pub fn geometry(&self) -> &GeometryStore {
        &self.geometry
    }

    pub fn stations(&self) -> &[BaseStation] {
        &self.stations
    }

    pub fn ues(&self) -> impl Iterator<Item = &Ue> {
        self.ues.values()
    }

    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    pub fn deployment(&self, sfc_id: &str) -> Option<&Deployment> {
        self.deployments.get(sfc_id)
    }

    pub fn active_deployment_count(&self) -> usize {
        self.deployments.values().filter(|d| !d.is_torn_down()).count()
    }

    /// Advance one timestep: sync the UE registry to the driver's active set
    /// and recompute every association.
    ///
    /// The whole input is validated before any state changes; on error the
    /// step is considered not to have occurred.
    pub fn step(&mut self, positions: &[UePosition]) -> Result<StepReport> {
        for p in positions {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(EngineError::InvalidGeometry {
                    what: format!("UE '{}' position ({}, {})", p.id, p.x, p.y),
                });
            }
        }

        let mut active: BTreeMap<&str, &UePosition> = BTreeMap::new();
        for p in positions {
            if active.insert(p.id.as_str(), p).is_some() {
                log::warn!("duplicate position update for UE '{}'; keeping the last", p.id);
            }
        }

        // Departures first, releasing their serving-cell bookkeeping.
        let departed: Vec<String> = self.ues.keys().filter(|id| !active.contains_key(id.as_str())).cloned().collect();
        for id in departed {
            if let Some(ue) = self.ues.remove(&id) {
                if let Some(station_id) = ue.serving {
                    if let Some(station) = self.stations.iter_mut().find(|s| s.id == station_id) {
                        station.connected_ues.remove(&id);
                    }
                }
                log::debug!("UE '{}' departed", id);
            }
        }

        // Arrivals and moves.
        for (id, p) in &active {
            let height_m = self.config.ue_heights.antenna_height_m(p.kind);
            self.ues
                .entry((*id).to_string())
                .and_modify(|ue| {
                    ue.position = Point { x: p.x, y: p.y };
                    ue.kind = p.kind;
                    ue.height_m = height_m;
                })
                .or_insert_with(|| Ue::new((*id).to_string(), p.kind, Point { x: p.x, y: p.y }, height_m));
        }

        // Association pass, in ascending UE id order for reproducibility.
        let ids: Vec<String> = self.ues.keys().cloned().collect();
        for id in ids {
            let Some(ue) = self.ues.get(&id) else { continue };
            let (serving, link) = association::associate(ue, &self.stations, &self.geometry, &self.config.radio, &self.config.association)?;

            let Some(ue) = self.ues.get_mut(&id) else { continue };
            let previous = ue.serving;
            ue.serving = serving;
            ue.link = Some(link);

            if previous != serving {
                log::debug!("UE '{}' handover {:?} -> {:?} at {:.1} dB", id, previous, serving, link.snr_db);
                if let Some(old_id) = previous {
                    if let Some(station) = self.stations.iter_mut().find(|s| s.id == old_id) {
                        station.connected_ues.remove(&id);
                    }
                }
            }
            if let Some(new_id) = serving {
                if let Some(station) = self.stations.iter_mut().find(|s| s.id == new_id) {
                    station.connected_ues.insert(id.clone());
                }
            }
        }

        self.timestep += 1;
        Ok(self.report())
    }

    /// Reporting snapshot of the current state.
    fn report(&self) -> StepReport {
        let ues = self
            .ues
            .values()
            .map(|ue| {
                let link = ue.link.unwrap_or(LinkQuality {
                    los: false,
                    snr_db: self.config.radio.snr_floor_db,
                    path_loss_db: 0.0,
                });
                UeLinkRecord {
                    ue_id: ue.id.clone(),
                    serving_cell: ue.serving,
                    snr_db: link.snr_db,
                    los: link.los,
                }
            })
            .collect();
        let stations = self
            .stations
            .iter()
            .map(|station| {
                let u = station.pool.utilization();
                StationLoadRecord {
                    station_id: station.id,
                    connected_ue_count: station.connected_ues.len(),
                    cpu_pct: u.cpu_pct,
                    mem_pct: u.mem_pct,
                    bw_pct: u.bw_pct,
                }
            })
            .collect();
        StepReport {
            timestep: self.timestep,
            ues,
            stations,
        }
    }

    /// Deploy an SFC. `on_behalf_of` names the requesting UE when the chain
    /// serves a specific user; its serving cell anchors the placement.
    ///
    /// Rejections are normal outcomes: they are reported in the returned
    /// record and never disturb other deployments' reservations.
    pub fn deploy_sfc(&mut self, request: SfcRequest, on_behalf_of: Option<&str>) -> DeploymentOutcome {
        let sfc = request.resolve();

        if self.deployments.get(&sfc.id).is_some_and(|d| !d.is_torn_down()) {
            let err = EngineError::DuplicateSfc { sfc_id: sfc.id.clone() };
            log::warn!("{err}");
            return DeploymentOutcome {
                sfc_id: sfc.id,
                accepted: false,
                reason: Some(err.to_string()),
                bound_stations: Vec::new(),
            };
        }

        let anchor = on_behalf_of.and_then(|id| self.ues.get(id)).and_then(|ue| ue.serving);

        match placement::deploy(&sfc, &mut self.stations, anchor, &self.config.placement) {
            Ok(deployment) => {
                let bound_stations = deployment.bound_stations();
                log::info!("SFC '{}' deployed on stations {:?}", sfc.id, bound_stations);
                self.deployments.insert(sfc.id.clone(), deployment);
                DeploymentOutcome {
                    sfc_id: sfc.id,
                    accepted: true,
                    reason: None,
                    bound_stations,
                }
            }
            Err(err) => {
                log::info!("SFC '{}' rejected: {err}", sfc.id);
                DeploymentOutcome {
                    sfc_id: sfc.id,
                    accepted: false,
                    reason: Some(err.to_string()),
                    bound_stations: Vec::new(),
                }
            }
        }
    }

    /// Tear down a deployed SFC, releasing all of its reservations.
    pub fn teardown_sfc(&mut self, sfc_id: &str) -> Result<()> {
        let deployment = self.deployments.get_mut(sfc_id).ok_or_else(|| EngineError::UnknownSfc { sfc_id: sfc_id.to_string() })?;
        placement::teardown(deployment, &mut self.stations)?;
        log::info!("SFC '{sfc_id}' torn down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::propagation::TxParams;
    use crate::engine::resources::ResourceVector;
    use crate::engine::types::{Building, VnfKind, VnfSpec, WorldBounds};

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn p(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    fn bounds() -> WorldBounds {
        WorldBounds {
            top_left: p(-1000.0, -1000.0),
            bottom_right: p(1000.0, 1000.0),
        }
    }

    fn station(id: u32, x: f64, y: f64) -> BaseStation {
        BaseStation::new(id, p(x, y), 25.0, TxParams::default(), ResourceVector::new(8.0, 1024.0, 500.0))
    }

    fn engine(buildings: Vec<Building>, stations: Vec<BaseStation>) -> NetworkEngine {
        NetworkEngine::new(GeometryStore::new(buildings, bounds()), stations, EngineConfig::default())
    }

    fn vehicle(id: &str, x: f64, y: f64) -> UePosition {
        UePosition {
            id: id.to_string(),
            kind: UeKind::Vehicle,
            x,
            y,
        }
    }

    fn request(id: &str, vnf_count: usize) -> SfcRequest {
        SfcRequest {
            id: id.to_string(),
            vnfs: (0..vnf_count)
                .map(|i| VnfSpec {
                    id: format!("{id}-vnf{i}"),
                    kind: VnfKind::Nat,
                    requirements: None,
                })
                .collect(),
            bandwidth_mbps: 50.0,
            latency_budget_ms: 50.0,
        }
    }

    #[test]
    fn step_associates_and_reports() {
        init_logs();
        let mut engine = engine(vec![], vec![station(1, 0.0, 0.0), station(2, 500.0, 0.0)]);
        let report = engine.step(&[vehicle("veh0", 50.0, 0.0), vehicle("veh1", 450.0, 0.0)]).unwrap();

        assert_eq!(report.timestep, 1);
        assert_eq!(report.ues.len(), 2);
        assert_eq!(report.ues[0].serving_cell, Some(1));
        assert_eq!(report.ues[1].serving_cell, Some(2));
        assert!(report.ues.iter().all(|u| u.los));

        let s1 = report.stations.iter().find(|s| s.station_id == 1).unwrap();
        assert_eq!(s1.connected_ue_count, 1);
    }

    #[test]
    fn departed_ue_leaves_the_connected_set() {
        let mut engine = engine(vec![], vec![station(1, 0.0, 0.0)]);
        engine.step(&[vehicle("veh0", 10.0, 0.0)]).unwrap();
        assert_eq!(engine.stations()[0].connected_ues.len(), 1);

        let report = engine.step(&[]).unwrap();
        assert!(report.ues.is_empty());
        assert_eq!(engine.stations()[0].connected_ues.len(), 0);
    }

    #[test]
    fn invalid_position_fails_the_whole_step() {
        let mut engine = engine(vec![], vec![station(1, 0.0, 0.0)]);
        let err = engine.step(&[vehicle("veh0", 10.0, 0.0), vehicle("veh1", f64::NAN, 0.0)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidGeometry { .. }));
        // The step did not occur: no UE registered, no timestep consumed.
        assert_eq!(engine.ues().count(), 0);
        assert_eq!(engine.timestep(), 0);
    }

    #[test]
    fn deployment_lifecycle_through_the_engine() {
        init_logs();
        let mut engine = engine(vec![], vec![station(1, 0.0, 0.0), station(2, 500.0, 0.0)]);
        engine.step(&[vehicle("veh0", 480.0, 0.0)]).unwrap();

        let outcome = engine.deploy_sfc(request("chain", 2), Some("veh0"));
        assert!(outcome.accepted);
        // Anchored at the UE's serving cell (station 2) and co-located.
        assert_eq!(outcome.bound_stations, vec![2, 2]);
        assert_eq!(engine.active_deployment_count(), 1);

        // Same id again while live: rejected, nothing reserved twice.
        let duplicate = engine.deploy_sfc(request("chain", 2), None);
        assert!(!duplicate.accepted);

        engine.teardown_sfc("chain").unwrap();
        assert_eq!(engine.active_deployment_count(), 0);
        let err = engine.teardown_sfc("chain").unwrap_err();
        assert!(matches!(err, EngineError::AlreadyTornDown { .. }));

        let err = engine.teardown_sfc("ghost").unwrap_err();
        assert!(matches!(err, EngineError::UnknownSfc { .. }));
    }

    #[test]
    fn rejected_deployment_leaves_existing_reservations_alone() {
        let mut engine = engine(vec![], vec![station(1, 0.0, 0.0)]);
        let first = engine.deploy_sfc(request("first", 1), None);
        assert!(first.accepted);
        let cpu_before = engine.stations()[0].pool.allocated().cpu_cores;

        // 20 NAT instances exceed the single station's CPU capacity.
        let second = engine.deploy_sfc(request("second", 20), None);
        assert!(!second.accepted);
        assert!(second.reason.is_some());
        assert_eq!(engine.stations()[0].pool.allocated().cpu_cores, cpu_before);
    }

    #[test]
    fn handover_needs_more_than_the_hysteresis_margin() {
        let mut engine = engine(vec![], vec![station(1, 0.0, 0.0), station(2, 200.0, 0.0)]);
        // Slightly closer to station 1.
        let report = engine.step(&[vehicle("veh0", 90.0, 0.0)]).unwrap();
        assert_eq!(report.ues[0].serving_cell, Some(1));

        // Drifting just past the midpoint is within the margin: no handover.
        let report = engine.step(&[vehicle("veh0", 104.0, 0.0)]).unwrap();
        assert_eq!(report.ues[0].serving_cell, Some(1));

        // Far past the midpoint the challenger clears the margin.
        let report = engine.step(&[vehicle("veh0", 185.0, 0.0)]).unwrap();
        assert_eq!(report.ues[0].serving_cell, Some(2));
    }

    #[test]
    fn step_report_serializes_for_the_external_logger() {
        let mut engine = engine(vec![], vec![station(1, 0.0, 0.0)]);
        let report = engine.step(&[vehicle("veh0", 10.0, 0.0)]).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"serving_cell\":1"));
        assert!(json.contains("\"connected_ue_count\":1"));
    }
}
