//! Radio link-quality calculations.
//!
//! Contains:
//! - Free-space path loss with an additive non-line-of-sight penalty
//! - Optional log-normal shadowing
//! - First-Fresnel-zone diffraction refinement for near-miss obstructions
//! - Thermal noise floor and SNR derivation
//!
//! Units:
//! - Power: dBm; gains and losses: dB
//! - Distance: meters; frequency/bandwidth: Hz

use rand::thread_rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::engine::geometry::{FresnelIntrusion, GeometryStore, distance3};
use crate::engine::types::{Point3, Segment3};
use crate::error::{EngineError, Result};

/// Thermal noise power density at room temperature, dBm per Hz.
const THERMAL_NOISE_DBM_HZ: f64 = -174.0;

/// Diffraction loss applied when an obstruction reaches the direct ray
/// (grazing incidence). Shallower intrusions scale this down linearly.
const FRESNEL_GRAZING_LOSS_DB: f64 = 6.0;

/// Parameters defining the radio channel propagation model.
#[derive(Debug, Deserialize, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct RadioParameters {
    /// Carrier frequency in Hz.
    pub frequency_hz: f64,
    /// Channel bandwidth in Hz, which sets the thermal noise floor.
    pub bandwidth_hz: f64,
    /// Fixed attenuation added once when the direct path is obstructed, dB.
    pub nlos_penalty_db: f64,
    /// Standard deviation for log-normal shadowing (σ) in dB.
    ///
    /// Represents random variation due to environmental clutter not captured
    /// by the deterministic path loss. 0.0 disables shadowing and keeps the
    /// model deterministic.
    pub shadowing_sigma_db: f64,
    /// Lower clamp for reported SNR, dB: "unusable but not undefined".
    pub snr_floor_db: f64,
}

impl Default for RadioParameters {
    fn default() -> Self {
        Self {
            frequency_hz: 3.5e9,
            bandwidth_hz: 20.0e6,
            nlos_penalty_db: 20.0,
            shadowing_sigma_db: 0.0,
            snr_floor_db: -20.0,
        }
    }
}

/// Per-station transmit parameters.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
#[serde(default, rename_all = "kebab-case")]
pub struct TxParams {
    /// Transmit power at the antenna port, dBm.
    pub tx_power_dbm: f64,
    /// Combined antenna gain on the link, dBi.
    pub antenna_gain_dbi: f64,
    /// Receiver noise figure, dB.
    pub noise_figure_db: f64,
}

impl Default for TxParams {
    fn default() -> Self {
        Self {
            tx_power_dbm: 30.0,
            antenna_gain_dbi: 8.0,
            noise_figure_db: 7.0,
        }
    }
}

/// Result of a link computation between one transmitter and one receiver.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct LinkQuality {
    /// Whether a direct unobstructed path exists.
    pub los: bool,
    /// Signal-to-noise ratio in dB, clamped to the configured floor.
    pub snr_db: f64,
    /// Total path loss in dB, including penalties.
    pub path_loss_db: f64,
}

/// Free-space path loss in dB.
///
/// `FSPL(d, f) = 20·log10(d) + 20·log10(f) − 147.55`
///
/// Distances below 1 meter are treated as 1 meter, so the loss is
/// non-negative and monotonically non-decreasing in distance.
pub fn free_space_path_loss_db(distance_m: f64, frequency_hz: f64) -> f64 {
    let d = distance_m.max(1.0);
    20.0 * d.log10() + 20.0 * frequency_hz.log10() - 147.55
}

/// Receiver noise floor in dBm: thermal noise over the channel bandwidth
/// plus the receiver's noise figure.
pub fn noise_floor_dbm(bandwidth_hz: f64, noise_figure_db: f64) -> f64 {
    THERMAL_NOISE_DBM_HZ + 10.0 * bandwidth_hz.log10() + noise_figure_db
}

/// Diffraction loss for a near-miss obstruction, scaled by how deep it
/// reaches into the first Fresnel zone. Decays to zero as the intrusion
/// vanishes; capped at the grazing loss.
fn diffraction_loss_db(intrusion: &FresnelIntrusion) -> f64 {
    if intrusion.radius_m <= 0.0 {
        return 0.0;
    }
    FRESNEL_GRAZING_LOSS_DB * (intrusion.depth_m / intrusion.radius_m).clamp(0.0, 1.0)
}

/// Compute LOS status, path loss, and SNR for one transmitter/receiver pair.
///
/// # Algorithm
///
/// 1. LOS test against the geometry store on the straight 3D segment.
/// 2. Free-space path loss over the 3D distance, plus optional log-normal
///    shadowing, plus the fixed NLOS penalty when obstructed.
/// 3. When unobstructed, a building intruding into the first Fresnel
///    ellipsoid contributes a smaller near-miss diffraction loss instead.
/// 4. SNR = tx power + antenna gain − path loss − noise floor, clamped to
///    the configured floor.
///
/// Non-finite input positions fail with `InvalidGeometry`; positions are
/// expected to have been taken from the mobility driver and the validated
/// scene, so this is a caller bug.
pub fn compute_link(tx_pos: Point3, rx_pos: Point3, tx: &TxParams, geometry: &GeometryStore, params: &RadioParameters) -> Result<LinkQuality> {
    if !tx_pos.is_finite() || !rx_pos.is_finite() {
        return Err(EngineError::InvalidGeometry {
            what: format!("non-finite link endpoint: tx={tx_pos:?}, rx={rx_pos:?}"),
        });
    }

    let seg = Segment3 { a: tx_pos, b: rx_pos };
    let los = geometry.query_obstruction(&seg).is_empty();
    let distance = distance3(&tx_pos, &rx_pos);

    let mut path_loss = free_space_path_loss_db(distance, params.frequency_hz);
    if params.shadowing_sigma_db > 0.0 {
        let normal = Normal::new(0.0_f64, params.shadowing_sigma_db).expect("invalid normal sigma");
        path_loss += normal.sample(&mut thread_rng());
    }
    if !los {
        path_loss += params.nlos_penalty_db;
    } else if let Some(intrusion) = geometry.max_fresnel_intrusion(&seg, params.frequency_hz) {
        path_loss += diffraction_loss_db(&intrusion);
    }
    path_loss = path_loss.max(0.0);

    let noise_floor = noise_floor_dbm(params.bandwidth_hz, tx.noise_figure_db);
    let snr_db = (tx.tx_power_dbm + tx.antenna_gain_dbi - path_loss - noise_floor).max(params.snr_floor_db);

    Ok(LinkQuality { los, snr_db, path_loss_db: path_loss })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Building, Point, WorldBounds};

    fn p(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    fn store(buildings: Vec<Building>) -> GeometryStore {
        GeometryStore::new(
            buildings,
            WorldBounds {
                top_left: p(-1000.0, -1000.0),
                bottom_right: p(1000.0, 1000.0),
            },
        )
    }

    fn square(id: u32, x0: f64, y0: f64, x1: f64, y1: f64, height: f64) -> Building {
        Building {
            id,
            ring: vec![p(x0, y0), p(x1, y0), p(x1, y1), p(x0, y1)],
            height_m: height,
        }
    }

    #[test]
    fn path_loss_monotonic_in_distance() {
        let f = 3.5e9;
        let mut previous = free_space_path_loss_db(0.5, f);
        for d in [1.0, 2.0, 10.0, 100.0, 1000.0] {
            let loss = free_space_path_loss_db(d, f);
            assert!(loss >= previous);
            previous = loss;
        }
    }

    #[test]
    fn noise_floor_matches_link_budget_form() {
        // -174 + 10*log10(20 MHz) + 7 ≈ -94 dBm
        let floor = noise_floor_dbm(20.0e6, 7.0);
        assert!((floor - (-93.99)).abs() < 0.1);
    }

    #[test]
    fn obstructed_link_loses_at_least_the_nlos_penalty() {
        // One 30 m building directly between a 25 m gNB and a 1.5 m UE.
        let tx = TxParams::default();
        let params = RadioParameters::default();
        let gnb = Point3::new(0.0, 0.0, 25.0);
        let ue = Point3::new(100.0, 0.0, 1.5);

        let blocked = compute_link(gnb, ue, &tx, &store(vec![square(1, 40.0, -10.0, 60.0, 10.0, 30.0)]), &params).unwrap();
        let clear = compute_link(gnb, ue, &tx, &store(vec![]), &params).unwrap();

        assert!(!blocked.los);
        assert!(clear.los);
        assert!(clear.snr_db - blocked.snr_db >= params.nlos_penalty_db - 1e-9);
    }

    #[test]
    fn near_miss_building_costs_up_to_the_grazing_loss() {
        let tx = TxParams::default();
        let params = RadioParameters::default();
        let gnb = Point3::new(0.0, 0.0, 25.0);
        let ue = Point3::new(100.0, 0.0, 1.5);

        let near_miss = compute_link(gnb, ue, &tx, &store(vec![square(1, 48.0, 1.0, 52.0, 3.0, 13.0)]), &params).unwrap();
        let clear = compute_link(gnb, ue, &tx, &store(vec![]), &params).unwrap();

        assert!(near_miss.los);
        let penalty = clear.snr_db - near_miss.snr_db;
        assert!(penalty > 0.0);
        assert!(penalty <= FRESNEL_GRAZING_LOSS_DB + 1e-9);
    }

    #[test]
    fn snr_clamped_to_floor_at_extreme_range() {
        let tx = TxParams::default();
        let params = RadioParameters::default();
        // Weak transmitter very far away: raw SNR would be far below -20 dB.
        let weak = TxParams {
            tx_power_dbm: -30.0,
            ..tx
        };
        let link = compute_link(Point3::new(0.0, 0.0, 25.0), Point3::new(900.0, 900.0, 1.5), &weak, &store(vec![]), &params).unwrap();
        assert_eq!(link.snr_db, params.snr_floor_db);
    }

    #[test]
    fn non_finite_positions_are_rejected() {
        let tx = TxParams::default();
        let params = RadioParameters::default();
        let result = compute_link(Point3::new(f64::NAN, 0.0, 25.0), Point3::new(100.0, 0.0, 1.5), &tx, &store(vec![]), &params);
        assert!(matches!(result, Err(EngineError::InvalidGeometry { .. })));
    }
}
