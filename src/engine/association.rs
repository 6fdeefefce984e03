//! Serving-cell selection.
//!
//! Per UE, per timestep: compute link quality against every station, prefer
//! line-of-sight candidates by SNR, fall back to the best NLOS candidate
//! above the connectivity threshold, and apply handover hysteresis against
//! the previous serving cell's freshly recomputed SNR. Absence of a usable
//! link degrades to "unserved", which is a normal outcome, never an error.

use serde::Deserialize;

use crate::engine::geometry::GeometryStore;
use crate::engine::propagation::{LinkQuality, RadioParameters, compute_link};
use crate::engine::types::{BaseStation, Ue};
use crate::error::Result;

/// Tunables for the association policy.
#[derive(Debug, Deserialize, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct AssociationParameters {
    /// A UE switches away from its serving cell only when the challenger's
    /// SNR exceeds the serving cell's by more than this margin, dB.
    /// Prevents ping-pong between near-equal cells.
    pub handover_hysteresis_db: f64,
    /// Minimum SNR for attaching to a non-line-of-sight cell, dB.
    pub min_connect_snr_db: f64,
    /// SNR differences within this tolerance count as a tie, dB.
    pub snr_tie_eps_db: f64,
}

impl Default for AssociationParameters {
    fn default() -> Self {
        Self {
            handover_hysteresis_db: 3.0,
            min_connect_snr_db: -5.0,
            snr_tie_eps_db: 0.05,
        }
    }
}

/// One station's freshly computed link for a UE.
#[derive(Debug, Clone, Copy)]
pub struct CellCandidate {
    pub station_id: u32,
    pub link: LinkQuality,
}

/// Pick the better of two candidates. Ties within tolerance keep the current
/// serving cell if it is one of them, otherwise resolve to the lower station
/// id so repeated runs with identical input agree.
fn prefer<'a>(a: &'a CellCandidate, b: &'a CellCandidate, current: Option<u32>, eps: f64) -> &'a CellCandidate {
    if (a.link.snr_db - b.link.snr_db).abs() <= eps {
        if current == Some(a.station_id) {
            return a;
        }
        if current == Some(b.station_id) {
            return b;
        }
        if a.station_id <= b.station_id { a } else { b }
    } else if a.link.snr_db > b.link.snr_db {
        a
    } else {
        b
    }
}

fn best_candidate<'a, I>(candidates: I, current: Option<u32>, eps: f64) -> Option<&'a CellCandidate>
where
    I: IntoIterator<Item = &'a CellCandidate>,
{
    candidates.into_iter().fold(None, |best, c| match best {
        None => Some(c),
        Some(b) => Some(prefer(b, c, current, eps)),
    })
}

/// Core selection policy over freshly computed candidates.
///
/// The decision is a pure function of `(current serving cell, candidates)`:
/// LOS candidates are preferred by SNR; without any, the strongest NLOS
/// candidate is taken if it clears the connectivity threshold; hysteresis
/// then keeps the current cell unless the challenger beats its fresh SNR by
/// more than the margin. A current cell that has itself dropped below
/// admissibility (NLOS under the threshold) no longer benefits from
/// hysteresis.
pub fn select_serving(current: Option<u32>, candidates: &[CellCandidate], params: &AssociationParameters) -> Option<CellCandidate> {
    let chosen = match best_candidate(candidates.iter().filter(|c| c.link.los), current, params.snr_tie_eps_db) {
        Some(los_best) => los_best,
        None => {
            let nlos_best = best_candidate(candidates.iter(), current, params.snr_tie_eps_db)?;
            if nlos_best.link.snr_db < params.min_connect_snr_db {
                return None;
            }
            nlos_best
        }
    };

    if let Some(current_id) = current {
        if chosen.station_id != current_id {
            if let Some(serving) = candidates.iter().find(|c| c.station_id == current_id) {
                let still_admissible = serving.link.los || serving.link.snr_db >= params.min_connect_snr_db;
                if still_admissible && chosen.link.snr_db <= serving.link.snr_db + params.handover_hysteresis_db {
                    return Some(*serving);
                }
            }
        }
    }
    Some(*chosen)
}

/// Associate one UE against all stations.
///
/// Returns the selected serving cell and its link quality. An unserved UE
/// still reports the strongest link found, so the caller always has a
/// meaningful SNR/LOS reading to log.
pub fn associate(
    ue: &Ue,
    stations: &[BaseStation],
    geometry: &GeometryStore,
    radio: &RadioParameters,
    params: &AssociationParameters,
) -> Result<(Option<u32>, LinkQuality)> {
    let rx = ue.position3();
    let mut candidates = Vec::with_capacity(stations.len());
    for station in stations {
        let link = compute_link(station.position3(), rx, &station.tx, geometry, radio)?;
        candidates.push(CellCandidate { station_id: station.id, link });
    }

    if let Some(selected) = select_serving(ue.serving, &candidates, params) {
        return Ok((Some(selected.station_id), selected.link));
    }

    let best_effort = best_candidate(candidates.iter(), None, params.snr_tie_eps_db)
        .map(|c| c.link)
        .unwrap_or(LinkQuality {
            los: false,
            snr_db: radio.snr_floor_db,
            path_loss_db: 0.0,
        });
    Ok((None, best_effort))
}
