use crate::label::LabelPlacement;
use rand::Rng;
use std::f64::consts::PI;

/// Annealing schedule and energy weights. The weight ordering encodes that
/// badge overlap is worst, leaving the canvas is next-worst, and drifting
/// from the anchor is a mild cost.
#[derive(Debug, Clone)]
pub struct AnnealParams {
    pub iterations: usize,
    /// Evenly spaced probe directions around each label.
    pub directions: usize,
    /// Probe step radius in pixels.
    pub radius: f64,
    pub initial_temperature: f64,
    pub cooling_rate: f64,
    pub w_overlap: f64,
    pub w_boundary: f64,
    pub w_distance: f64,
    /// When set, return the lowest-energy configuration ever observed
    /// instead of whatever was last accepted.
    pub return_best: bool,
}

impl Default for AnnealParams {
    fn default() -> Self {
        Self {
            iterations: 200,
            directions: 12,
            radius: 20.0,
            initial_temperature: 100.0,
            cooling_rate: 0.95,
            w_overlap: 10.0,
            w_boundary: 5.0,
            w_distance: 1.0,
            return_best: false,
        }
    }
}

/// Area of the axis-aligned intersection of two badge rectangles; zero when
/// disjoint or touching only along an edge. Symmetric in its arguments.
pub fn overlap_area(a: &LabelPlacement, b: &LabelPlacement) -> f64 {
    let overlap_w = (a.x + a.width).min(b.x + b.width) - a.x.max(b.x);
    let overlap_h = (a.y + a.height).min(b.y + b.height) - a.y.max(b.y);
    if overlap_w <= 0.0 || overlap_h <= 0.0 {
        return 0.0;
    }
    overlap_w * overlap_h
}

/// Overflow area beyond each of the four canvas edges, computed
/// independently per edge and summed; zero for a fully-inside rectangle.
pub fn boundary_penalty(label: &LabelPlacement, canvas_w: f64, canvas_h: f64) -> f64 {
    let left = (-label.x).max(0.0) * label.height;
    let top = (-label.y).max(0.0) * label.width;
    let right = (label.x + label.width - canvas_w).max(0.0) * label.height;
    let bottom = (label.y + label.height - canvas_h).max(0.0) * label.width;
    left + top + right + bottom
}

fn anchor_distance(label: &LabelPlacement) -> f64 {
    let dx = label.x - label.anchor_x;
    let dy = label.y - label.anchor_y;
    (dx * dx + dy * dy).sqrt()
}

/// Scalar cost of a whole configuration: weighted pairwise overlap plus
/// per-label boundary overflow plus per-label anchor drift.
pub fn energy(
    placements: &[LabelPlacement],
    canvas_w: f64,
    canvas_h: f64,
    params: &AnnealParams,
) -> f64 {
    let mut overlap = 0.0;
    for i in 0..placements.len() {
        for j in (i + 1)..placements.len() {
            overlap += overlap_area(&placements[i], &placements[j]);
        }
    }
    let mut boundary = 0.0;
    let mut distance = 0.0;
    for label in placements {
        boundary += boundary_penalty(label, canvas_w, canvas_h);
        distance += anchor_distance(label);
    }
    params.w_overlap * overlap + params.w_boundary * boundary + params.w_distance * distance
}

/// Simulated annealing with greedy direction probing.
///
/// Each iteration picks one label uniformly at random, probes a fixed ring
/// of offsets around its current position with a full-configuration rescore
/// per probe, then accepts the best offset outright if it improves the
/// energy, or with Boltzmann probability otherwise. The temperature cools
/// every iteration and the loop always consumes its full budget.
///
/// The input slice is never mutated; callers get fresh placements with the
/// same markId set and untouched anchors. Zero or one placement returns a
/// plain copy, since no overlap is possible.
pub fn optimize_label_positions<R: Rng>(
    placements: &[LabelPlacement],
    canvas_w: f64,
    canvas_h: f64,
    params: &AnnealParams,
    rng: &mut R,
) -> Vec<LabelPlacement> {
    let mut current: Vec<LabelPlacement> = placements.to_vec();
    if current.len() <= 1 {
        return current;
    }

    let offsets: Vec<(f64, f64)> = (0..params.directions)
        .map(|i| {
            let angle = 2.0 * PI * (i as f64) / (params.directions as f64);
            (params.radius * angle.cos(), params.radius * angle.sin())
        })
        .collect();

    let mut temperature = params.initial_temperature;
    let mut current_energy = energy(&current, canvas_w, canvas_h, params);
    let initial_energy = current_energy;
    let mut best = current.clone();
    let mut best_energy = current_energy;

    for _ in 0..params.iterations {
        let idx = rng.gen_range(0..current.len());
        let home = (current[idx].x, current[idx].y);

        let mut candidate: Option<(f64, f64, f64)> = None;
        for (dx, dy) in &offsets {
            current[idx].x = home.0 + dx;
            current[idx].y = home.1 + dy;
            let probed = energy(&current, canvas_w, canvas_h, params);
            if candidate.map_or(true, |(_, _, e)| probed < e) {
                candidate = Some((current[idx].x, current[idx].y, probed));
            }
        }
        current[idx].x = home.0;
        current[idx].y = home.1;

        if let Some((nx, ny, probed)) = candidate {
            let accept = if probed < current_energy {
                true
            } else {
                rng.gen::<f64>() < (-(probed - current_energy) / temperature).exp()
            };
            if accept {
                current[idx].x = nx;
                current[idx].y = ny;
                current_energy = probed;
                if current_energy < best_energy {
                    best = current.clone();
                    best_energy = current_energy;
                }
            }
        }

        temperature *= params.cooling_rate;
    }

    log::debug!(
        "annealed {} labels: energy {:.1} -> {:.1} (best {:.1})",
        current.len(),
        initial_energy,
        current_energy,
        best_energy
    );

    if params.return_best && best_energy < current_energy {
        return best;
    }
    current
}

/// Production entry point: unseeded entropy, original return-last behavior.
pub fn optimize_labels(
    placements: &[LabelPlacement],
    canvas_w: f64,
    canvas_h: f64,
    params: &AnnealParams,
) -> Vec<LabelPlacement> {
    optimize_label_positions(placements, canvas_w, canvas_h, params, &mut rand::thread_rng())
}
