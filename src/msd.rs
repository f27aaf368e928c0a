/*
Mean squared displacement with multiple time origins

    MSD(lag) = < |r_p(t + lag) - r_p(t)|^2 >  averaged over particles p and origins t

Every frame is used as a time origin, so the lag `lag` is averaged over
`nframes - lag` origins. This costs O(natoms * nframes^2) and is the dominant
cost of the whole analysis; using only t = 0 would be O(natoms * nframes) but
statistically much poorer. Large lags have few origins and are noisy.
 */

use crate::cancel::{CancellationToken, Outcome};
use crate::constants::{DIMENSIONS, PROGRESS_STRIDE};
use crate::error::{MsdError, Result};
use crate::progress::Progress;
use crate::trajectory::{PeriodicState, Trajectory};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MsdPoint {
    pub time: f64,
    pub value: f64,
}

/// One point per lag, lag 1 first.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MsdCurve {
    points: Vec<MsdPoint>,
}

/// Axis limits for displaying part of the curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PlotWindow {
    pub x_start: f64,
    pub x_end: f64,
    pub y_start: f64,
    pub y_end: f64,
}

impl MsdCurve {
    pub fn new(points: Vec<MsdPoint>) -> Self {
        MsdCurve { points }
    }

    pub fn points(&self) -> &[MsdPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.points.first().map(|p| p.time)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.points.last().map(|p| p.time)
    }

    /// Window used to rescale a plot of the curve to `[x_start, x_end]`.
    ///
    /// Missing bounds fall back to the first/last lag time. `y_start` is the
    /// value of the first point past `x_start` and `y_end` the value of the
    /// first point at or past `x_end`.
    pub fn plot_window(&self, x_start: Option<f64>, x_end: Option<f64>) -> Option<PlotWindow> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        let x_start = x_start.unwrap_or_else(|| {
            log::warn!("Using default plot start {}", first.time);
            first.time
        });
        let x_end = x_end.unwrap_or_else(|| {
            log::warn!("Using default plot end {}", last.time);
            last.time
        });

        let y_start = self
            .points
            .iter()
            .find(|p| x_start < p.time)
            .map_or(first.value, |p| p.value);
        let y_end = self
            .points
            .iter()
            .find(|p| x_end <= p.time)
            .map_or(last.value, |p| p.value);

        Some(PlotWindow {
            x_start,
            x_end,
            y_start,
            y_end,
        })
    }
}

/// Multiple-time-origin MSD of every particle in the trajectory.
///
/// Entry `lag - 1` holds the average over `(nframes - lag) * natoms`
/// displacements and is stamped with the lag time `time[lag] - time[0]`.
/// The cancellation token is polled once per particle; a cancelled run
/// returns no curve at all.
pub fn compute_msd(
    trajectory: &Trajectory,
    cancel: &CancellationToken,
    progress: &mut dyn Progress,
) -> Result<Outcome<MsdCurve>> {
    if let PeriodicState::PartiallyUnwrapped { .. } = trajectory.periodic_state() {
        return Err(MsdError::InconsistentTrajectory);
    }

    let natoms = trajectory.natoms();
    let nframes = trajectory.nframes();
    let mut totals = vec![0.0f64; nframes.saturating_sub(1)];

    progress.start("MSD", natoms);
    for atom in 0..natoms {
        if cancel.is_cancelled() {
            progress.finish();
            log::warn!("MSD calculation cancelled after {atom} of {natoms} particles");
            return Ok(Outcome::Cancelled);
        }

        let track = trajectory.track(atom);
        for lag in 1..nframes {
            let mut squared = 0.0;
            for origin in 0..nframes - lag {
                for axis in 0..DIMENSIONS {
                    let d = track[[origin + lag, axis]] - track[[origin, axis]];
                    squared += d * d;
                }
            }
            totals[lag - 1] += squared;
        }

        if (atom + 1) % PROGRESS_STRIDE == 0 || atom + 1 == natoms {
            progress.advance(atom + 1);
        }
    }
    progress.finish();

    let time = trajectory.time();
    let points: Vec<MsdPoint> = totals
        .iter()
        .enumerate()
        .map(|(index, total)| {
            let lag = index + 1;
            MsdPoint {
                time: time[lag] - time[0],
                value: total / ((nframes - lag) * natoms) as f64,
            }
        })
        .collect();

    log::info!("MSD computed for {} lags over {natoms} particles", points.len());
    Ok(Outcome::Complete(MsdCurve::new(points)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Silent;

    use approx::assert_relative_eq;
    use ndarray::Array3;
    use rand::Rng;

    fn trajectory(positions: Array3<f64>) -> Trajectory {
        let nframes = positions.dim().1;
        Trajectory::new(positions, (0..nframes).map(|f| f as f64).collect()).unwrap()
    }

    fn run(traj: &Trajectory) -> MsdCurve {
        compute_msd(traj, &CancellationToken::new(), &mut Silent)
            .unwrap()
            .completed()
            .expect("not cancelled")
    }

    #[test]
    fn stationary_particles_have_zero_msd() {
        let mut positions = Array3::zeros((3, 6, 3));
        for atom in 0..3 {
            for frame in 0..6 {
                positions[[atom, frame, 0]] = atom as f64 * 1.5;
                positions[[atom, frame, 1]] = -2.0;
                positions[[atom, frame, 2]] = 7.25;
            }
        }
        let curve = run(&trajectory(positions));
        assert_eq!(curve.len(), 5);
        assert!(curve.points().iter().all(|p| p.value == 0.0));
    }

    #[test]
    fn constant_step_gives_quadratic_msd() {
        let step = 0.3;
        let nframes = 8;
        let mut positions = Array3::zeros((1, nframes, 3));
        for frame in 0..nframes {
            positions[[0, frame, 0]] = step * frame as f64;
        }
        let curve = run(&trajectory(positions));
        for (index, point) in curve.points().iter().enumerate() {
            let lag = (index + 1) as f64;
            assert_relative_eq!(point.time, lag);
            assert_relative_eq!(point.value, (step * lag).powi(2), epsilon = 1e-12);
        }
    }

    #[test]
    fn curve_has_one_non_negative_entry_per_lag() {
        let mut rng = rand::rng();
        let (natoms, nframes) = (5, 30);
        let mut positions = Array3::zeros((natoms, nframes, 3));
        positions.mapv_inplace(|_: f64| rng.random_range(-3.0..3.0));
        let curve = run(&trajectory(positions));
        assert_eq!(curve.len(), nframes - 1);
        assert!(curve.points().iter().all(|p| p.value >= 0.0));
    }

    #[test]
    fn averages_over_particles_and_origins() {
        // particle 0 moves 1 per frame on x, particle 1 stays put
        let mut positions = Array3::zeros((2, 3, 3));
        positions[[0, 1, 0]] = 1.0;
        positions[[0, 2, 0]] = 2.0;
        let curve = run(&trajectory(positions));
        assert_relative_eq!(curve.points()[0].value, 0.5);
        assert_relative_eq!(curve.points()[1].value, 2.0);
    }

    #[test]
    fn lag_time_is_relative_to_first_frame() {
        let positions = Array3::zeros((1, 3, 3));
        let traj = Trajectory::new(positions, vec![100.0, 150.0, 200.0]).unwrap();
        let curve = run(&traj);
        let times: Vec<f64> = curve.points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![50.0, 100.0]);
    }

    #[test]
    fn single_frame_gives_empty_curve() {
        let curve = run(&trajectory(Array3::zeros((2, 1, 3))));
        assert!(curve.is_empty());
        assert_eq!(curve.plot_window(None, None), None);
    }

    #[test]
    fn cancelled_run_returns_no_curve() {
        let token = CancellationToken::new();
        token.cancel();
        let traj = trajectory(Array3::zeros((2, 4, 3)));
        let outcome = compute_msd(&traj, &token, &mut Silent).unwrap();
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn plot_window_follows_requested_range() {
        let curve = MsdCurve::new(
            (1..=5)
                .map(|i| MsdPoint {
                    time: i as f64,
                    value: (i * i) as f64,
                })
                .collect(),
        );
        let window = curve.plot_window(Some(2.0), Some(4.0)).unwrap();
        assert_eq!(window.y_start, 9.0);
        assert_eq!(window.y_end, 16.0);

        let full = curve.plot_window(None, None).unwrap();
        assert_eq!((full.x_start, full.x_end), (1.0, 5.0));
        assert_eq!(full.y_end, 25.0);

        let past_end = curve.plot_window(Some(0.0), Some(99.0)).unwrap();
        assert_eq!(past_end.y_start, 1.0);
        assert_eq!(past_end.y_end, 25.0);
    }
}
