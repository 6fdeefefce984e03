//! Greedy SFC placement over base-station resource pools.
//!
//! VNFs are processed in chain order against an explicit, total candidate
//! ordering: feasibility first, then co-location with the chain's previous
//! hop, then lower load, then lower station id. Deployment is atomic: either
//! the whole chain is bound and reserved, or every reservation made for it is
//! rolled back and the call fails.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::engine::resources::ResourceVector;
use crate::engine::types::{BaseStation, ServiceFunctionChain, Vnf};
use crate::error::{EngineError, Result};

/// Latency model constants for chain verification.
#[derive(Debug, Deserialize, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct PlacementParameters {
    /// Latency of one transition between different stations, ms.
    pub per_hop_latency_ms: f64,
    /// Processing latency of one VNF, ms.
    pub per_vnf_processing_ms: f64,
}

impl Default for PlacementParameters {
    fn default() -> Self {
        Self {
            per_hop_latency_ms: 2.0,
            per_vnf_processing_ms: 0.5,
        }
    }
}

/// One VNF bound to its hosting station.
#[derive(Debug, Serialize, Clone)]
pub struct VnfBinding {
    pub vnf_id: String,
    pub station_id: u32,
}

/// A successfully deployed chain with its live reservations.
#[derive(Debug, Clone)]
pub struct Deployment {
    sfc_id: String,
    bindings: Vec<VnfBinding>,
    reservations: Vec<(u32, ResourceVector)>,
    torn_down: bool,
}

impl Deployment {
    pub fn sfc_id(&self) -> &str {
        &self.sfc_id
    }

    /// Bindings in chain order.
    pub fn bindings(&self) -> &[VnfBinding] {
        &self.bindings
    }

    /// Hosting stations in chain order (one entry per VNF).
    pub fn bound_stations(&self) -> Vec<u32> {
        self.bindings.iter().map(|b| b.station_id).collect()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

/// Requirement actually reserved for a VNF: its own profile, with bandwidth
/// raised to the chain's aggregate rate, since the chain's whole traffic
/// volume transits every VNF.
fn effective_requirements(vnf: &Vnf, sfc: &ServiceFunctionChain) -> ResourceVector {
    ResourceVector {
        bandwidth_mbps: vnf.requirements.bandwidth_mbps.max(sfc.bandwidth_mbps),
        ..vnf.requirements
    }
}

/// Total candidate ordering for one VNF: co-location with the previous hop
/// first, then lower load, then lower station id. Deterministic for
/// identical pool states.
fn compare_candidates(a: &BaseStation, b: &BaseStation, previous_hop: Option<u32>) -> Ordering {
    let a_colocated = previous_hop == Some(a.id);
    let b_colocated = previous_hop == Some(b.id);
    b_colocated
        .cmp(&a_colocated)
        .then_with(|| {
            a.pool
                .max_utilization_pct()
                .partial_cmp(&b.pool.max_utilization_pct())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// End-to-end latency estimate for a bound chain: per-VNF processing plus
/// one hop for each transition between different adjacent stations, plus the
/// access hop from the anchor (the requesting UE's serving cell) when the
/// first VNF landed elsewhere.
pub fn estimate_chain_latency_ms(bindings: &[VnfBinding], anchor: Option<u32>, params: &PlacementParameters) -> f64 {
    let processing = bindings.len() as f64 * params.per_vnf_processing_ms;
    let mut hops = bindings.windows(2).filter(|w| w[0].station_id != w[1].station_id).count();
    if let (Some(anchor_id), Some(first)) = (anchor, bindings.first()) {
        if first.station_id != anchor_id {
            hops += 1;
        }
    }
    processing + hops as f64 * params.per_hop_latency_ms
}

fn rollback(stations: &mut [BaseStation], reserved: &[(u32, ResourceVector)]) {
    for (station_id, request) in reserved.iter().rev() {
        match stations.iter_mut().find(|s| s.id == *station_id) {
            Some(station) => {
                if let Err(dimension) = station.pool.release(request) {
                    log::error!("rollback release failed on station {} ({})", station_id, dimension);
                }
            }
            None => log::error!("rollback references unknown station {}", station_id),
        }
    }
}

/// Place every VNF of `sfc`, in chain order, onto the given stations.
///
/// `anchor` is the serving cell of the UE the chain is requested for, when
/// known; it seeds the co-location preference for the first VNF and adds the
/// access hop to the latency estimate. On any failure all reservations made
/// for this chain are released before returning, so a rejected deployment
/// leaves every pool exactly as it found it.
pub fn deploy(sfc: &ServiceFunctionChain, stations: &mut [BaseStation], anchor: Option<u32>, params: &PlacementParameters) -> Result<Deployment> {
    if sfc.vnfs.is_empty() {
        return Err(EngineError::EmptyChain { sfc_id: sfc.id.clone() });
    }

    let mut reserved: Vec<(u32, ResourceVector)> = Vec::with_capacity(sfc.vnfs.len());
    let mut bindings: Vec<VnfBinding> = Vec::with_capacity(sfc.vnfs.len());
    let mut previous_hop = anchor;

    for vnf in &sfc.vnfs {
        let request = effective_requirements(vnf, sfc);

        let mut ranked: Vec<usize> = (0..stations.len()).filter(|&i| stations[i].pool.can_fit(&request)).collect();
        ranked.sort_by(|&x, &y| compare_candidates(&stations[x], &stations[y], previous_hop));

        let mut placed: Option<u32> = None;
        for index in ranked {
            if stations[index].pool.try_reserve(&request) {
                placed = Some(stations[index].id);
                break;
            }
        }

        match placed {
            Some(station_id) => {
                reserved.push((station_id, request));
                bindings.push(VnfBinding {
                    vnf_id: vnf.id.clone(),
                    station_id,
                });
                previous_hop = Some(station_id);
            }
            None => {
                rollback(stations, &reserved);
                return Err(EngineError::InsufficientResources {
                    sfc_id: sfc.id.clone(),
                    vnf_id: vnf.id.clone(),
                });
            }
        }
    }

    let estimated_ms = estimate_chain_latency_ms(&bindings, anchor, params);
    if estimated_ms > sfc.latency_budget_ms {
        rollback(stations, &reserved);
        return Err(EngineError::LatencyBudgetExceeded {
            sfc_id: sfc.id.clone(),
            estimated_ms,
            budget_ms: sfc.latency_budget_ms,
        });
    }

    log::debug!("deployed SFC '{}' across stations {:?} ({:.2} ms)", sfc.id, bindings.iter().map(|b| b.station_id).collect::<Vec<_>>(), estimated_ms);
    Ok(Deployment {
        sfc_id: sfc.id.clone(),
        bindings,
        reservations: reserved,
        torn_down: false,
    })
}

/// Release every reservation the deployment holds.
///
/// A second teardown of the same deployment fails with `AlreadyTornDown` and
/// leaves pool counters unchanged.
pub fn teardown(deployment: &mut Deployment, stations: &mut [BaseStation]) -> Result<()> {
    if deployment.torn_down {
        return Err(EngineError::AlreadyTornDown {
            sfc_id: deployment.sfc_id.clone(),
        });
    }
    deployment.torn_down = true;

    let mut first_error: Option<EngineError> = None;
    for (station_id, request) in &deployment.reservations {
        match stations.iter_mut().find(|s| s.id == *station_id) {
            Some(station) => {
                if let Err(dimension) = station.pool.release(request) {
                    first_error.get_or_insert(EngineError::PoolAccounting {
                        station_id: *station_id,
                        dimension,
                    });
                }
            }
            None => {
                first_error.get_or_insert(EngineError::UnknownStation { station_id: *station_id });
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::propagation::TxParams;
    use crate::engine::types::{Point, Vnf, VnfKind};

    fn station(id: u32, cpu: f64, memory: f64, bandwidth: f64) -> BaseStation {
        BaseStation::new(
            id,
            Point { x: 0.0, y: 0.0 },
            25.0,
            TxParams::default(),
            ResourceVector::new(cpu, memory, bandwidth),
        )
    }

    fn vnf(id: &str, cpu: f64, memory: f64, bandwidth: f64) -> Vnf {
        Vnf {
            id: id.to_string(),
            kind: VnfKind::Firewall,
            requirements: ResourceVector::new(cpu, memory, bandwidth),
        }
    }

    fn chain(id: &str, vnfs: Vec<Vnf>, budget_ms: f64) -> ServiceFunctionChain {
        ServiceFunctionChain {
            id: id.to_string(),
            vnfs,
            bandwidth_mbps: 10.0,
            latency_budget_ms: budget_ms,
        }
    }

    fn total_allocated(stations: &[BaseStation]) -> f64 {
        stations.iter().map(|s| s.pool.allocated().cpu_cores + s.pool.allocated().memory_mb + s.pool.allocated().bandwidth_mbps).sum()
    }

    #[test]
    fn chain_colocates_when_capacity_allows() {
        let mut stations = vec![station(1, 8.0, 1024.0, 500.0), station(2, 8.0, 1024.0, 500.0)];
        let sfc = chain("sfc", vec![vnf("a", 2.0, 128.0, 10.0), vnf("b", 2.0, 128.0, 10.0)], 100.0);
        let deployment = deploy(&sfc, &mut stations, None, &PlacementParameters::default()).unwrap();
        assert_eq!(deployment.bound_stations(), vec![1, 1]);
    }

    #[test]
    fn anchor_station_seeds_the_first_vnf() {
        let mut stations = vec![station(1, 8.0, 1024.0, 500.0), station(2, 8.0, 1024.0, 500.0)];
        let sfc = chain("sfc", vec![vnf("a", 2.0, 128.0, 10.0)], 100.0);
        let deployment = deploy(&sfc, &mut stations, Some(2), &PlacementParameters::default()).unwrap();
        assert_eq!(deployment.bound_stations(), vec![2]);
    }

    #[test]
    fn lower_load_wins_over_lower_id() {
        let mut stations = vec![station(1, 8.0, 1024.0, 500.0), station(2, 8.0, 1024.0, 500.0)];
        assert!(stations[0].pool.try_reserve(&ResourceVector::new(4.0, 0.0, 0.0)));
        let sfc = chain("sfc", vec![vnf("a", 2.0, 128.0, 10.0)], 100.0);
        let deployment = deploy(&sfc, &mut stations, None, &PlacementParameters::default()).unwrap();
        assert_eq!(deployment.bound_stations(), vec![2]);
    }

    #[test]
    fn unplaceable_vnf_rolls_back_the_whole_chain() {
        // Third VNF fits nowhere once the first two consumed both stations.
        let mut stations = vec![station(1, 4.0, 1024.0, 500.0), station(2, 4.0, 1024.0, 500.0), station(3, 0.5, 1024.0, 500.0)];
        let sfc = chain(
            "sfc",
            vec![vnf("a", 4.0, 128.0, 10.0), vnf("b", 4.0, 128.0, 10.0), vnf("c", 4.0, 128.0, 10.0)],
            100.0,
        );
        let err = deploy(&sfc, &mut stations, None, &PlacementParameters::default()).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientResources { .. }));
        assert_eq!(total_allocated(&stations), 0.0);
    }

    #[test]
    fn latency_overrun_rolls_back_reservations() {
        // Each station only fits one VNF, forcing a hop; tight budget fails.
        let params = PlacementParameters::default();
        let mut stations = vec![station(1, 4.0, 1024.0, 500.0), station(2, 4.0, 1024.0, 500.0)];
        let sfc = chain("sfc", vec![vnf("a", 4.0, 128.0, 10.0), vnf("b", 4.0, 128.0, 10.0)], 2.5);
        let err = deploy(&sfc, &mut stations, None, &params).unwrap_err();
        match err {
            EngineError::LatencyBudgetExceeded { estimated_ms, .. } => {
                // 2 x 0.5 ms processing + 1 x 2.0 ms hop
                assert!((estimated_ms - 3.0).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(total_allocated(&stations), 0.0);
    }

    #[test]
    fn latency_counts_the_access_hop_from_the_anchor() {
        let params = PlacementParameters::default();
        let bindings = vec![
            VnfBinding {
                vnf_id: "a".to_string(),
                station_id: 1,
            },
            VnfBinding {
                vnf_id: "b".to_string(),
                station_id: 1,
            },
        ];
        assert!((estimate_chain_latency_ms(&bindings, None, &params) - 1.0).abs() < 1e-9);
        assert!((estimate_chain_latency_ms(&bindings, Some(1), &params) - 1.0).abs() < 1e-9);
        assert!((estimate_chain_latency_ms(&bindings, Some(2), &params) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn teardown_restores_pools_and_guards_double_release() {
        let mut stations = vec![station(1, 8.0, 1024.0, 500.0)];
        let sfc = chain("sfc", vec![vnf("a", 2.0, 128.0, 10.0), vnf("b", 2.0, 128.0, 10.0)], 100.0);
        let mut deployment = deploy(&sfc, &mut stations, None, &PlacementParameters::default()).unwrap();
        assert!(total_allocated(&stations) > 0.0);

        teardown(&mut deployment, &mut stations).unwrap();
        assert_eq!(total_allocated(&stations), 0.0);

        let err = teardown(&mut deployment, &mut stations).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyTornDown { .. }));
        assert_eq!(total_allocated(&stations), 0.0);
        assert!(!stations[0].pool.is_poisoned());
    }

    #[test]
    fn empty_chain_is_rejected() {
        let mut stations = vec![station(1, 8.0, 1024.0, 500.0)];
        let sfc = chain("sfc", vec![], 100.0);
        let err = deploy(&sfc, &mut stations, None, &PlacementParameters::default()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyChain { .. }));
    }

    #[test]
    fn randomized_deploy_teardown_never_oversubscribes_any_pool() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(11);
        let params = PlacementParameters::default();
        let mut stations = vec![station(1, 8.0, 1024.0, 500.0), station(2, 6.0, 2048.0, 400.0), station(3, 12.0, 512.0, 800.0)];
        let mut live: Vec<Deployment> = Vec::new();

        for round in 0..200 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let vnfs = (0..rng.gen_range(1..4))
                    .map(|i| vnf(&format!("sfc{round}-v{i}"), rng.gen_range(0.5..3.0), rng.gen_range(32.0..256.0), rng.gen_range(5.0..60.0)))
                    .collect();
                let sfc = chain(&format!("sfc{round}"), vnfs, 100.0);
                if let Ok(deployment) = deploy(&sfc, &mut stations, None, &params) {
                    live.push(deployment);
                }
            } else {
                let idx = rng.gen_range(0..live.len());
                let mut deployment = live.swap_remove(idx);
                teardown(&mut deployment, &mut stations).unwrap();
            }

            for station in &stations {
                let a = station.pool.allocated();
                let c = station.pool.capacity();
                assert!(a.cpu_cores <= c.cpu_cores + 1e-6);
                assert!(a.memory_mb <= c.memory_mb + 1e-6);
                assert!(a.bandwidth_mbps <= c.bandwidth_mbps + 1e-6);
                assert!(!station.pool.is_poisoned());
            }
        }

        for mut deployment in live {
            teardown(&mut deployment, &mut stations).unwrap();
        }
        // Only floating-point dust may remain once everything is released.
        assert!(total_allocated(&stations) < 1e-6);
    }

    #[test]
    fn aggregate_bandwidth_governs_the_reservation() {
        let mut stations = vec![station(1, 8.0, 1024.0, 500.0)];
        let mut sfc = chain("sfc", vec![vnf("a", 2.0, 128.0, 10.0)], 100.0);
        sfc.bandwidth_mbps = 400.0;
        let _deployment = deploy(&sfc, &mut stations, None, &PlacementParameters::default()).unwrap();
        assert!((stations[0].pool.allocated().bandwidth_mbps - 400.0).abs() < 1e-9);
    }
}
