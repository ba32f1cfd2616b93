//! Differential-pair synthesis (spec.md component C7): route a pseudo-net
//! along the midline of a declared diff pair, project the two parallel
//! "shoulder" paths at half-pitch, place diff-pair vias, match them to
//! shoulders, and splice them in (spec.md §4.5).

use crate::error::{Error, Result};
use crate::geometry::Coordinate;
use crate::grid::PathId;

/// Maximum symmetric shoulder-shift attempts before giving up (spec.md
/// §4.5).
pub const MAX_SHOULDER_SHIFT_ATTEMPTS: u32 = 10;
pub const SHOULDER_SHIFT_STEP_CELLS: f64 = 0.3;
/// A proposed shoulder segment whose turn from the previous one exceeds
/// this angle (degrees) is rejected as a sharp back-track.
pub const SHARP_TURN_REJECT_DEGREES: f64 = 20.0;
/// Polarity flips when successive unit normals diverge by more than this
/// angle (degrees).
pub const POLARITY_FLIP_DEGREES: f64 = 90.0;
/// Diff-pair via radial search spans `[0.5, 1.2] * nominal_distance`.
pub const VIA_SEARCH_MIN_FACTOR: f64 = 0.5;
pub const VIA_SEARCH_MAX_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Copy)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x - o.x, self.y - o.y)
    }

    pub fn len(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalized(self) -> Vec2 {
        let l = self.len();
        if l < 1e-9 {
            self
        } else {
            Vec2::new(self.x / l, self.y / l)
        }
    }

    pub fn dot(self, o: Vec2) -> f64 {
        self.x * o.x + self.y * o.y
    }

    pub fn perpendicular(self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    pub fn angle_degrees_to(self, o: Vec2) -> f64 {
        let a = self.normalized();
        let b = o.normalized();
        a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
    }
}

pub fn coord_to_vec2(c: Coordinate) -> Vec2 {
    Vec2::new(c.x as f64, c.y as f64)
}

/// One shoulder point with its side (true = shoulder A, false = shoulder
/// B) and the layer it lives on.
#[derive(Debug, Clone, Copy)]
pub struct ShoulderPoint {
    pub position: Vec2,
    pub z: u8,
    pub side_a: bool,
}

/// Estimates the local tangent direction at `index` from its immediate
/// neighbors (spec.md §4.5). For equally spaced samples this centered
/// difference is exactly the derivative, at the middle point, of the
/// parabola interpolating the three points, so no separate parabola fit is
/// needed; at a path endpoint it degenerates to a single secant.
fn local_tangent(path: &[Coordinate], index: usize) -> Vec2 {
    let n = path.len();
    if n < 2 {
        return Vec2::new(1.0, 0.0);
    }
    let prev = coord_to_vec2(path[index.saturating_sub(1)]);
    let next = coord_to_vec2(path[(index + 1).min(n - 1)]);
    next.sub(prev).normalized()
}

/// Generates shoulder points for both sides of the pseudo-path at the
/// given half-pitch, applying the polarity-flip rule across segments
/// (spec.md §4.5).
pub fn project_shoulders(pseudo_path: &[Coordinate], half_pitch_cells: f64) -> Vec<(ShoulderPoint, ShoulderPoint)> {
    let mut out = Vec::with_capacity(pseudo_path.len());
    let mut prev_normal: Option<Vec2> = None;
    let mut flipped = false;

    for (i, &c) in pseudo_path.iter().enumerate() {
        let tangent = local_tangent(pseudo_path, i);
        let mut normal = tangent.perpendicular();

        if let Some(prev) = prev_normal {
            if prev.angle_degrees_to(normal) > POLARITY_FLIP_DEGREES {
                flipped = !flipped;
            }
        }
        prev_normal = Some(normal);
        if flipped {
            normal = Vec2::new(-normal.x, -normal.y);
        }

        let base = coord_to_vec2(c);
        let a = Vec2::new(base.x + normal.x * half_pitch_cells, base.y + normal.y * half_pitch_cells);
        let b = Vec2::new(base.x - normal.x * half_pitch_cells, base.y - normal.y * half_pitch_cells);
        out.push((
            ShoulderPoint { position: a, z: c.z, side_a: true },
            ShoulderPoint { position: b, z: c.z, side_a: false },
        ));
    }
    out
}

/// Refines a raw `project_shoulders` output against per-cell legality and
/// turn/pin-swap acceptance (spec.md §4.5): a forbidden pair is shifted
/// outward via `resolve_forbidden_shoulder` (kept as the raw projection,
/// with a warning, if no legal position is found); a segment rejected by
/// `segment_is_acceptable` holds the previous point instead of advancing.
pub fn refine_shoulders(
    pseudo_path: &[Coordinate],
    shoulders: &[(ShoulderPoint, ShoulderPoint)],
    half_pitch_cells: f64,
    is_forbidden: impl Fn(Vec2, u8) -> bool,
    near_pin_swap: impl Fn(Vec2, Vec2, u8) -> bool,
) -> Vec<(ShoulderPoint, ShoulderPoint)> {
    let mut out = Vec::with_capacity(shoulders.len());
    let mut prev_a: Option<Vec2> = None;
    let mut prev_b: Option<Vec2> = None;

    for (i, &(sa, sb)) in shoulders.iter().enumerate() {
        let base = coord_to_vec2(pseudo_path[i]);
        let tangent = local_tangent(pseudo_path, i);
        let z = sa.z;
        let normal = sa.position.sub(base).normalized();

        let (mut a, mut b) = (sa.position, sb.position);
        if is_forbidden(a, z) || is_forbidden(b, z) {
            match resolve_forbidden_shoulder(i, base, normal, half_pitch_cells, |p| is_forbidden(p, z)) {
                Ok((ra, rb)) => {
                    a = ra;
                    b = rb;
                }
                Err(_) => {
                    log::warn!(
                        "diff-pair shoulder segment {} could not clear a forbidden zone; keeping the raw projection",
                        i
                    );
                }
            }
        }

        let pin_swap_a = |p1: Vec2, p2: Vec2| near_pin_swap(p1, p2, z);
        if !segment_is_acceptable(prev_a, a, tangent, base, pin_swap_a) {
            a = prev_a.unwrap_or(a);
        }
        let pin_swap_b = |p1: Vec2, p2: Vec2| near_pin_swap(p1, p2, z);
        if !segment_is_acceptable(prev_b, b, tangent, base, pin_swap_b) {
            b = prev_b.unwrap_or(b);
        }
        prev_a = Some(a);
        prev_b = Some(b);

        out.push((
            ShoulderPoint { position: a, z, side_a: true },
            ShoulderPoint { position: b, z, side_a: false },
        ));
    }
    out
}

/// Searches symmetrically outward along the normal for a pair of shoulder
/// positions that both clear `is_forbidden`, per spec.md §4.5: shift both
/// shoulders together in `SHOULDER_SHIFT_STEP_CELLS` increments, up to
/// `MAX_SHOULDER_SHIFT_ATTEMPTS` times.
pub fn resolve_forbidden_shoulder(
    segment_index: usize,
    center: Vec2,
    normal: Vec2,
    half_pitch_cells: f64,
    is_forbidden: impl Fn(Vec2) -> bool,
) -> Result<(Vec2, Vec2)> {
    let unit = normal.normalized();
    for attempt in 0..=MAX_SHOULDER_SHIFT_ATTEMPTS {
        let shift = attempt as f64 * SHOULDER_SHIFT_STEP_CELLS;
        let dist = half_pitch_cells + shift;
        let a = Vec2::new(center.x + unit.x * dist, center.y + unit.y * dist);
        let b = Vec2::new(center.x - unit.x * dist, center.y - unit.y * dist);
        if !is_forbidden(a) && !is_forbidden(b) {
            return Ok((a, b));
        }
    }
    Err(Error::DiffPairShoulderInfeasible { segment: segment_index })
}

/// Rejects a proposed shoulder segment whose turn from the previous one
/// is too sharp, or whose line to the pseudo-path passes near a pin-swap
/// zone (spec.md §4.5). Returns `true` when the segment should be kept.
pub fn segment_is_acceptable(
    previous: Option<Vec2>,
    proposed: Vec2,
    tangent: Vec2,
    pseudo_point: Vec2,
    near_pin_swap: impl Fn(Vec2, Vec2) -> bool,
) -> bool {
    if let Some(prev) = previous {
        let step = proposed.sub(prev);
        if step.len() > 1e-9 && step.angle_degrees_to(tangent) > SHARP_TURN_REJECT_DEGREES {
            return false;
        }
    }
    !near_pin_swap(pseudo_point, proposed)
}

/// A single diff-pair via-stack proposal: two candidate (x, y) centers at
/// the perpendicular offset computed from the pseudo-path tangents on
/// either side of the transition, at the nominal pseudo-to-shoulder
/// distance (spec.md §4.5).
#[derive(Debug, Clone, Copy)]
pub struct ViaProposal {
    pub pivot: Vec2,
    pub candidate_a: Vec2,
    pub candidate_b: Vec2,
    pub z_from: u8,
    pub z_to: u8,
}

/// Derives the perpendicular direction for a via-stack from the
/// pseudo-path tangent before and after it: bisecting the two when both
/// exist, or rotating the single available tangent 90° (spec.md §4.5).
pub fn via_perpendicular(before: Option<Vec2>, after: Option<Vec2>) -> Vec2 {
    match (before, after) {
        (Some(b), Some(a)) => {
            let bisector = Vec2::new(b.x + a.x, b.y + a.y);
            if bisector.len() < 1e-9 {
                b.perpendicular()
            } else {
                bisector.normalized().perpendicular()
            }
        }
        (Some(t), None) | (None, Some(t)) => t.perpendicular(),
        (None, None) => Vec2::new(0.0, 1.0),
    }
}

/// Nominal pseudo-to-shoulder distance at a via-stack: the maximum of the
/// four via/spacing combinations and half the diff-pair pitch, over every
/// layer the stack passes through (spec.md §4.5).
pub fn nominal_via_distance(
    via_up_diameter_cells: f64,
    via_down_diameter_cells: f64,
    spacing_via_up_cells: f64,
    spacing_via_down_cells: f64,
    spacing_trace_cells: f64,
    diff_pair_pitch_cells: f64,
) -> f64 {
    let candidates = [
        0.5 * (via_up_diameter_cells + spacing_via_up_cells),
        0.5 * (via_up_diameter_cells + spacing_trace_cells),
        0.5 * (via_down_diameter_cells + spacing_via_down_cells),
        0.5 * (via_down_diameter_cells + spacing_trace_cells),
        0.5 * diff_pair_pitch_cells,
    ];
    candidates.iter().cloned().fold(0.0, f64::max)
}

/// Proposes via-stack centers, then if either violates `is_legal`, runs
/// the bounded radial search from `min = 0.5*d` to `max = 1.2*d` for the
/// nearest legal substitute for *both* candidates independently (spec.md
/// §4.5). Fails fatally only if no legal substitute exists for one of
/// them anywhere in the search annulus.
pub fn place_vias(
    pivot: Vec2,
    perpendicular: Vec2,
    nominal_distance: f64,
    path_a: PathId,
    path_b: PathId,
    at: Coordinate,
    is_legal: impl Fn(Vec2) -> bool,
) -> Result<(Vec2, Vec2)> {
    let unit = perpendicular.normalized();
    let candidate_a = Vec2::new(
        pivot.x + unit.x * nominal_distance,
        pivot.y + unit.y * nominal_distance,
    );
    let candidate_b = Vec2::new(
        pivot.x - unit.x * nominal_distance,
        pivot.y - unit.y * nominal_distance,
    );

    let resolve = |center: Vec2, side: Vec2| -> Option<Vec2> {
        if is_legal(center) {
            return Some(center);
        }
        const RADIAL_STEPS: u32 = 16;
        const ANGULAR_STEPS: u32 = 16;
        let min_r = VIA_SEARCH_MIN_FACTOR * nominal_distance;
        let max_r = VIA_SEARCH_MAX_FACTOR * nominal_distance;
        for step in 0..=RADIAL_STEPS {
            let r = min_r + (max_r - min_r) * (step as f64 / RADIAL_STEPS as f64);
            for a in 0..ANGULAR_STEPS {
                let theta = std::f64::consts::TAU * (a as f64 / ANGULAR_STEPS as f64);
                let (sin, cos) = theta.sin_cos();
                let dir = Vec2::new(
                    side.x * cos - side.y * sin,
                    side.x * sin + side.y * cos,
                );
                let cand = Vec2::new(pivot.x + dir.x * r, pivot.y + dir.y * r);
                if is_legal(cand) {
                    return Some(cand);
                }
            }
        }
        None
    };

    let a = resolve(candidate_a, unit);
    let b = resolve(candidate_b, Vec2::new(-unit.x, -unit.y));
    match (a, b) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::DiffPairViaInfeasible { path_a, path_b, at }),
    }
}

/// Squared distance from a point to a segment, used by via/shoulder
/// matching.
fn distance_to_segment_sq(p: Vec2, seg_a: Vec2, seg_b: Vec2) -> f64 {
    let d = seg_b.sub(seg_a);
    let len_sq = d.dot(d);
    if len_sq < 1e-12 {
        return p.sub(seg_a).dot(p.sub(seg_a));
    }
    let t = (p.sub(seg_a).dot(d) / len_sq).clamp(0.0, 1.0);
    let proj = Vec2::new(seg_a.x + d.x * t, seg_a.y + d.y * t);
    p.sub(proj).dot(p.sub(proj))
}

/// Chooses which of via A / via B maps to shoulder 1 / shoulder 2 by
/// comparing `D(A->1, B->2)` against `D(A->2, B->1)`, where `D` sums the
/// via-to-before/after-segment distances on its assigned shoulder (spec.md
/// §4.5). Returns `true` when A should map to shoulder 1 (the natural
/// orientation), `false` when it should be swapped.
pub fn match_vias_to_shoulders(
    via_a: Vec2,
    via_b: Vec2,
    shoulder1_before: Vec2,
    shoulder1_after: Vec2,
    shoulder2_before: Vec2,
    shoulder2_after: Vec2,
) -> bool {
    let d_a1 = distance_to_segment_sq(via_a, shoulder1_before, shoulder1_after);
    let d_b2 = distance_to_segment_sq(via_b, shoulder2_before, shoulder2_after);
    let d_a2 = distance_to_segment_sq(via_a, shoulder2_before, shoulder2_after);
    let d_b1 = distance_to_segment_sq(via_b, shoulder1_before, shoulder1_after);

    (d_a1 + d_b2) <= (d_a2 + d_b1)
}

/// Finds the shoulder-path segment index nearest a layer transition (a Z
/// change between consecutive dense cells) matching both `from_layer` and
/// `to_layer`; falls back to matching only `from_layer`, then only
/// `to_layer` (spec.md §4.5 "Splicing").
pub fn find_nearby_layer_transition(
    shoulder: &[Coordinate],
    from_layer: u8,
    to_layer: u8,
) -> Result<usize> {
    let find = |want_from: Option<u8>, want_to: Option<u8>| -> Option<usize> {
        shoulder.windows(2).position(|w| {
            let from_ok = want_from.map(|z| w[0].z == z).unwrap_or(true);
            let to_ok = want_to.map(|z| w[1].z == z).unwrap_or(true);
            from_ok && to_ok && w[0].z != w[1].z
        })
    };
    find(Some(from_layer), Some(to_layer))
        .or_else(|| find(Some(from_layer), None))
        .or_else(|| find(None, Some(to_layer)))
        .ok_or(Error::DiffPairSpliceFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_shoulders_offsets_perpendicular_to_straight_run() {
        let path = vec![
            Coordinate::new(0, 0, 0),
            Coordinate::new(1, 0, 0),
            Coordinate::new(2, 0, 0),
            Coordinate::new(3, 0, 0),
        ];
        let shoulders = project_shoulders(&path, 2.0);
        assert_eq!(shoulders.len(), 4);
        for (a, b) in &shoulders {
            assert!((a.position.y.abs() - 2.0).abs() < 1e-6 || (b.position.y.abs() - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn refine_shoulders_pushes_a_forbidden_pair_outward() {
        let path = vec![
            Coordinate::new(5, 5, 0),
            Coordinate::new(6, 5, 0),
            Coordinate::new(7, 5, 0),
        ];
        let raw = project_shoulders(&path, 1.0);
        // Forbid everything within 1.4 cells of the centerline so the
        // nominal projection at distance 1.0 must be pushed outward.
        let is_forbidden = |p: Vec2, _z: u8| (p.y - 5.0).abs() < 1.4;
        let refined = refine_shoulders(&path, &raw, 1.0, is_forbidden, |_, _, _| false);
        for (a, b) in &refined {
            assert!((a.position.y - 5.0).abs() >= 1.4);
            assert!((b.position.y - 5.0).abs() >= 1.4);
        }
    }

    #[test]
    fn resolve_forbidden_shoulder_finds_legal_pair_further_out() {
        let result = resolve_forbidden_shoulder(
            0,
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            1.0,
            |p| p.y.abs() < 1.5,
        );
        let (a, b) = result.unwrap();
        assert!(a.y >= 1.5);
        assert!(b.y <= -1.5);
    }

    #[test]
    fn resolve_forbidden_shoulder_fails_when_always_forbidden() {
        let result = resolve_forbidden_shoulder(0, Vec2::new(0.0, 0.0), Vec2::new(0.0, 1.0), 1.0, |_| true);
        assert!(result.is_err());
    }

    #[test]
    fn sharp_turn_is_rejected() {
        let tangent = Vec2::new(1.0, 0.0);
        let prev = Vec2::new(0.0, 1.0);
        let proposed_bad = Vec2::new(0.0, -1.0); // near-reversal
        assert!(!segment_is_acceptable(Some(prev), proposed_bad, tangent, Vec2::new(0.0, 0.0), |_, _| false));
        let proposed_good = Vec2::new(1.0, 1.0);
        assert!(segment_is_acceptable(Some(prev), proposed_good, tangent, Vec2::new(0.0, 0.0), |_, _| false));
    }

    #[test]
    fn nominal_via_distance_picks_the_maximum_candidate() {
        let d = nominal_via_distance(2.0, 1.0, 0.5, 0.5, 0.2, 10.0);
        assert_eq!(d, 5.0); // half the pitch dominates
    }

    #[test]
    fn place_vias_returns_nominal_when_both_legal() {
        let (a, b) = place_vias(
            Vec2::new(5.0, 5.0),
            Vec2::new(0.0, 1.0),
            2.0,
            0,
            1,
            Coordinate::new(5, 5, 0),
            |_| true,
        )
        .unwrap();
        assert!((a.y - 7.0).abs() < 1e-6);
        assert!((b.y - 3.0).abs() < 1e-6);
    }

    #[test]
    fn place_vias_fails_when_no_legal_substitute_exists() {
        let result = place_vias(
            Vec2::new(5.0, 5.0),
            Vec2::new(0.0, 1.0),
            2.0,
            0,
            1,
            Coordinate::new(5, 5, 0),
            |_| false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn matching_prefers_natural_orientation_when_closer() {
        let shoulder1_before = Vec2::new(0.0, 2.0);
        let shoulder1_after = Vec2::new(2.0, 2.0);
        let shoulder2_before = Vec2::new(0.0, -2.0);
        let shoulder2_after = Vec2::new(2.0, -2.0);
        let via_a = Vec2::new(1.0, 2.0); // on shoulder 1
        let via_b = Vec2::new(1.0, -2.0); // on shoulder 2
        assert!(match_vias_to_shoulders(
            via_a,
            via_b,
            shoulder1_before,
            shoulder1_after,
            shoulder2_before,
            shoulder2_after
        ));
    }

    #[test]
    fn find_nearby_layer_transition_falls_back_to_from_layer_only() {
        let shoulder = vec![
            Coordinate::new(0, 0, 0),
            Coordinate::new(0, 0, 1),
            Coordinate::new(0, 0, 2),
        ];
        // Exact (0 -> 1) match exists; (0 -> 2) doesn't, so it falls back
        // to from-layer-only and finds the same transition.
        let idx = find_nearby_layer_transition(&shoulder, 0, 2).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn find_nearby_layer_transition_errors_when_nothing_matches() {
        let shoulder = vec![Coordinate::new(0, 0, 0), Coordinate::new(1, 0, 0)];
        assert!(find_nearby_layer_transition(&shoulder, 5, 6).is_err());
    }
}
