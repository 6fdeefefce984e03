//! Geometry store: building footprints and line-of-sight queries.
//!
//! Contains:
//! - Point-in-polygon and segment/polygon-edge intersection tests
//! - Segment-segment intersection with collinear handling
//! - 3D obstruction queries with height interpolation along the sight line
//! - First-Fresnel-zone intrusion measurement for near-miss buildings
//! - Distance calculations (squared distance to avoid sqrt in hot paths)

use crate::engine::types::{Building, Point, Point3, Segment3, WorldBounds};

/// Propagation speed used for wavelength calculations (m/s).
const SPEED_OF_LIGHT_M_S: f64 = 3.0e8;

/// Squared Euclidean distance in the ground plane (avoids a sqrt in hot paths).
///
/// Comparing d1² vs d2² is enough for range checks; the square root is only
/// taken when a real distance feeds the path-loss formula.
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Full 3D Euclidean distance in meters.
pub fn distance3(a: &Point3, b: &Point3) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Height of the sight line at parametric position `t` (0 at `a`, 1 at `b`),
/// linearly interpolated between the endpoint altitudes.
pub fn los_height(seg: &Segment3, t: f64) -> f64 {
    seg.a.z + (seg.b.z - seg.a.z) * t
}

/// Orientation of ordered triplet (a,b,c): returns 1 if clockwise, -1 if
/// counter-clockwise, and 0 if collinear.
fn orientation(a: &Point, b: &Point, c: &Point) -> i32 {
    let val = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if val > 0.0 {
        1
    } else if val < 0.0 {
        -1
    } else {
        0
    }
}

/// True if point b lies on segment a–c, assuming collinearity.
fn on_segment(a: &Point, b: &Point, c: &Point) -> bool {
    let min_x = a.x.min(c.x);
    let max_x = a.x.max(c.x);
    let min_y = a.y.min(c.y);
    let max_y = a.y.max(c.y);
    b.x >= min_x && b.x <= max_x && b.y >= min_y && b.y <= max_y
}

/// Robust segment–segment intersection including collinear overlap.
///
/// Uses the orientation-based algorithm which handles all cases correctly:
/// proper crossings, endpoint touching, and collinear overlap. Touching
/// counts as intersecting, which keeps obstruction tests conservative when a
/// sight line exactly grazes a footprint edge.
pub fn segments_intersect(p1: &Point, q1: &Point, p2: &Point, q2: &Point) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true; // Proper intersection
    }
    // Special cases: collinear and overlapping endpoints
    (o1 == 0 && on_segment(p1, p2, q1)) || (o2 == 0 && on_segment(p1, q2, q1)) || (o3 == 0 && on_segment(p2, p1, q2)) || (o4 == 0 && on_segment(p2, q1, q2))
}

/// Parametric positions along `p1 -> q1` where it meets segment `p2 -> q2`.
///
/// A proper crossing yields one value. A collinear overlap yields the
/// projections of the overlapping endpoints; since any quantity linear in `t`
/// attains its extremes at interval ends, reporting the ends is exact for
/// obstruction-height checks.
fn crossing_params(p1: &Point, q1: &Point, p2: &Point, q2: &Point, out: &mut Vec<f64>) {
    if !segments_intersect(p1, q1, p2, q2) {
        return;
    }
    let d1x = q1.x - p1.x;
    let d1y = q1.y - p1.y;
    let d2x = q2.x - p2.x;
    let d2y = q2.y - p2.y;
    let denom = d1x * d2y - d1y * d2x;
    if denom.abs() > f64::EPSILON {
        let t = ((p2.x - p1.x) * d2y - (p2.y - p1.y) * d2x) / denom;
        out.push(t.clamp(0.0, 1.0));
        return;
    }
    // Parallel and intersecting: collinear overlap. Project both endpoints of
    // the other segment onto p1..q1.
    let len2 = d1x * d1x + d1y * d1y;
    if len2 <= f64::EPSILON {
        out.push(0.0);
        return;
    }
    for p in [p2, q2] {
        let t = ((p.x - p1.x) * d1x + (p.y - p1.y) * d1y) / len2;
        out.push(t.clamp(0.0, 1.0));
    }
}

/// Even-odd point-in-polygon test over a closed ring.
pub fn point_in_polygon(p: &Point, ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = &ring[i];
        let pj = &ring[j];
        if (pi.y > p.y) != (pj.y > p.y) {
            let x_cross = pj.x + (p.y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from point `p` to segment `a -> b`, with the parametric position
/// of the closest point. Uses projection with the parameter clamped to the
/// segment.
fn point_segment_distance(p: &Point, a: &Point, b: &Point) -> (f64, f64) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 <= f64::EPSILON {
        return (distance2(p, a).sqrt(), 0.0);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    let closest = Point {
        x: a.x + t * dx,
        y: a.y + t * dy,
    };
    (distance2(p, &closest).sqrt(), t)
}

/// Minimum distance between two 2D segments, with the parametric position on
/// the first segment at the closest approach.
fn segment_segment_distance(p1: &Point, q1: &Point, p2: &Point, q2: &Point) -> (f64, f64) {
    if segments_intersect(p1, q1, p2, q2) {
        let mut ts = Vec::with_capacity(2);
        crossing_params(p1, q1, p2, q2, &mut ts);
        return (0.0, ts.first().copied().unwrap_or(0.0));
    }
    let (d_a, t_a) = point_segment_distance(p2, p1, q1);
    let (d_b, t_b) = point_segment_distance(q2, p1, q1);
    let (d_c, _) = point_segment_distance(p1, p2, q2);
    let (d_d, _) = point_segment_distance(q1, p2, q2);

    let mut best = (d_a, t_a);
    if d_b < best.0 {
        best = (d_b, t_b);
    }
    if d_c < best.0 {
        best = (d_c, 0.0);
    }
    if d_d < best.0 {
        best = (d_d, 1.0);
    }
    best
}

/// Deepest measured intrusion of a near-miss building into the first Fresnel
/// ellipsoid around a sight line.
#[derive(Debug, Clone, Copy)]
pub struct FresnelIntrusion {
    /// How far inside the ellipsoid the building reaches, in meters.
    pub depth_m: f64,
    /// First Fresnel radius at the intrusion point, in meters.
    pub radius_m: f64,
}

/// Holds the 3D building set and answers occlusion queries.
///
/// Built once from the validated scene configuration and shared read-only by
/// every component that needs geometry data; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct GeometryStore {
    buildings: Vec<Building>,
    bounds: WorldBounds,
}

impl GeometryStore {
    pub fn new(buildings: Vec<Building>, bounds: WorldBounds) -> Self {
        Self { buildings, bounds }
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    /// Every building whose footprint the 2D projection of `seg` crosses,
    /// restricted to buildings taller than the sight line at a crossing point.
    ///
    /// Segment endpoints outside the configured world bounds return an empty
    /// result (treated as LOS-permissive): the simulated area is finite and
    /// an overflow indicates a caller bug, not a runtime condition to recover
    /// from mid-simulation.
    pub fn query_obstruction(&self, seg: &Segment3) -> Vec<&Building> {
        if !self.bounds.contains(&seg.a.xy()) || !self.bounds.contains(&seg.b.xy()) {
            log::warn!(
                "obstruction query outside world bounds: ({:.1}, {:.1}) -> ({:.1}, {:.1})",
                seg.a.x,
                seg.a.y,
                seg.b.x,
                seg.b.y
            );
            return Vec::new();
        }
        self.buildings.iter().filter(|b| Self::obstructs(b, seg)).collect()
    }

    /// True if `building` blocks the sight line: its footprint is crossed in
    /// 2D and its roof exceeds the interpolated line height at some crossing
    /// point. The line height is linear in the segment parameter, so
    /// checking crossing points (plus endpoints inside the footprint) is
    /// exact.
    fn obstructs(building: &Building, seg: &Segment3) -> bool {
        let a = seg.a.xy();
        let b = seg.b.xy();
        let mut ts: Vec<f64> = Vec::new();

        if a == b {
            // Degenerate segment: a point inside the footprint
            if point_in_polygon(&a, &building.ring) {
                ts.push(0.0);
            }
        } else {
            for (e1, e2) in building.edges() {
                crossing_params(&a, &b, e1, e2, &mut ts);
            }
            if point_in_polygon(&a, &building.ring) {
                ts.push(0.0);
            }
            if point_in_polygon(&b, &building.ring) {
                ts.push(1.0);
            }
        }

        ts.iter().any(|&t| building.height_m > los_height(seg, t))
    }

    /// Deepest intrusion into the first Fresnel ellipsoid by a building that
    /// does NOT directly obstruct the sight line, or `None` when the zone is
    /// clear.
    ///
    /// Clearance at a building's nearest approach combines the 2D footprint
    /// distance to the sight line with the vertical clearance between the
    /// line and the roof (floored at zero for roofs above the line). The
    /// first Fresnel radius at parametric position `t` is
    /// `sqrt(λ·d1·d2/(d1+d2))`.
    pub fn max_fresnel_intrusion(&self, seg: &Segment3, frequency_hz: f64) -> Option<FresnelIntrusion> {
        let a = seg.a.xy();
        let b = seg.b.xy();
        if !self.bounds.contains(&a) || !self.bounds.contains(&b) {
            return None;
        }
        let total = distance3(&seg.a, &seg.b);
        if total < 1.0 || frequency_hz <= 0.0 {
            return None;
        }
        let lambda = SPEED_OF_LIGHT_M_S / frequency_hz;

        let mut best: Option<FresnelIntrusion> = None;
        for building in &self.buildings {
            if Self::obstructs(building, seg) {
                continue;
            }
            let (horizontal, t) = Self::footprint_distance(building, &a, &b);
            let d1 = t * total;
            let d2 = (1.0 - t) * total;
            if d1 <= 0.0 || d2 <= 0.0 {
                continue;
            }
            let radius = (lambda * d1 * d2 / total).sqrt();
            let vertical = (los_height(seg, t) - building.height_m).max(0.0);
            let clearance = (horizontal * horizontal + vertical * vertical).sqrt();
            let depth = radius - clearance;
            if depth > 0.0 && best.is_none_or(|cur| depth > cur.depth_m) {
                best = Some(FresnelIntrusion {
                    depth_m: depth,
                    radius_m: radius,
                });
            }
        }
        best
    }

    /// Nearest 2D approach of a footprint to segment `a -> b`: the minimum
    /// distance and the parametric position on the segment where it occurs.
    fn footprint_distance(building: &Building, a: &Point, b: &Point) -> (f64, f64) {
        if point_in_polygon(a, &building.ring) {
            return (0.0, 0.0);
        }
        if point_in_polygon(b, &building.ring) {
            return (0.0, 1.0);
        }
        let mut best = (f64::INFINITY, 0.0);
        for (e1, e2) in building.edges() {
            let (dist, t) = segment_segment_distance(a, b, e1, e2);
            if dist < best.0 {
                best = (dist, t);
            }
        }
        best
    }
}
