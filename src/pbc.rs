pub mod periodic_boundary_conditions {

    /*
    How do we undo periodic boundaries before a displacement analysis?

    A particle leaving one face of the box re-enters through the opposite one,
    so the raw coordinate jumps by roughly one box length between two frames.
    The MSD of such wrapped coordinates is meaningless. Walking every particle
    through time, a jump larger than half the box length is taken as a
    boundary crossing and the particle is shifted back by one box length from
    that frame onward.

    The box is given per axis as (min, max). Values the user did not give fall
    back to the extrema of the raw coordinates.
     */

    use crate::cancel::{CancellationToken, Outcome};
    use crate::constants::DIMENSIONS;
    use crate::error::{MsdError, Result};
    use crate::progress::Progress;
    use crate::trajectory::{BoundingBox, PeriodicState, Trajectory};

    use ndarray::Array3;
    use serde::Serialize;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
    pub enum BoundSource {
        User,
        Detected,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Serialize)]
    pub struct AxisBounds {
        pub min: f64,
        pub max: f64,
        pub min_source: BoundSource,
        pub max_source: BoundSource,
    }

    impl AxisBounds {
        pub fn length(&self) -> f64 {
            self.max - self.min
        }
    }

    /// Optional user bounds for one axis.
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct AxisOverride {
        pub min: Option<f64>,
        pub max: Option<f64>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Serialize)]
    pub struct SimulationBox {
        pub x_dimension: AxisBounds,
        pub y_dimension: AxisBounds,
        pub z_dimension: AxisBounds,
    }

    impl SimulationBox {
        /// Merge user bounds with the detected extrema. Negative user values are rejected.
        pub fn resolve(overrides: &[AxisOverride; DIMENSIONS], detected: &BoundingBox) -> Self {
            let axis = |i: usize| {
                let (min, min_source) = pick_bound(overrides[i].min, detected.min[i], i, "min");
                let (max, max_source) = pick_bound(overrides[i].max, detected.max[i], i, "max");
                AxisBounds {
                    min,
                    max,
                    min_source,
                    max_source,
                }
            };
            SimulationBox {
                x_dimension: axis(0),
                y_dimension: axis(1),
                z_dimension: axis(2),
            }
        }

        /// A box spanning `[0, L]` on every axis.
        pub fn from_lengths(lengths: [f64; DIMENSIONS]) -> Self {
            let axis = |length: f64| AxisBounds {
                min: 0.0,
                max: length,
                min_source: BoundSource::User,
                max_source: BoundSource::User,
            };
            SimulationBox {
                x_dimension: axis(lengths[0]),
                y_dimension: axis(lengths[1]),
                z_dimension: axis(lengths[2]),
            }
        }

        pub fn axes(&self) -> [&AxisBounds; DIMENSIONS] {
            [&self.x_dimension, &self.y_dimension, &self.z_dimension]
        }

        pub fn lengths(&self) -> [f64; DIMENSIONS] {
            self.axes().map(AxisBounds::length)
        }

        /// Axes paired with their lower-case names, in x, y, z order.
        pub fn named_axes(&self) -> [(char, &AxisBounds); DIMENSIONS] {
            let [x, y, z] = self.axes();
            let [nx, ny, nz] = AXIS_NAMES;
            [(nx, x), (ny, y), (nz, z)]
        }
    }

    fn pick_bound(user: Option<f64>, detected: f64, axis: usize, which: &str) -> (f64, BoundSource) {
        match user {
            Some(value) if value.is_finite() && value >= 0.0 => (value, BoundSource::User),
            Some(value) => {
                log::warn!(
                    "Rejected box {which} {value} on axis {}; using detected value {detected}",
                    AXIS_NAMES[axis]
                );
                (detected, BoundSource::Detected)
            }
            None => (detected, BoundSource::Detected),
        }
    }

    pub const AXIS_NAMES: [char; DIMENSIONS] = ['x', 'y', 'z'];

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
    pub struct UnwrapStats {
        pub frames_done: usize,
        pub shifts: usize,
        pub cancelled: bool,
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct UnwrapReport {
        pub simulation_box: SimulationBox,
        pub disabled_axes: Vec<char>,
        pub shifts: usize,
    }

    /// In-place unwrap of a `[natoms, nframes, 3]` array.
    ///
    /// Axes with a non-positive (or non-finite) length are left alone. The
    /// cancellation token is polled once per frame; on cancellation frames
    /// `0..frames_done` are unwrapped and the rest are untouched. Running it a
    /// second time with the same lengths performs no shifts.
    pub fn unwrap_positions(
        positions: &mut Array3<f64>,
        lengths: &[f64; DIMENSIONS],
        cancel: &CancellationToken,
        progress: &mut dyn Progress,
    ) -> UnwrapStats {
        let (natoms, nframes, _) = positions.dim();
        let active: Vec<usize> = (0..DIMENSIONS)
            .filter(|&axis| lengths[axis].is_finite() && lengths[axis] > 0.0)
            .collect();

        // accumulated correction per particle and axis
        let mut shift = vec![[0.0f64; DIMENSIONS]; natoms];
        let mut stats = UnwrapStats {
            frames_done: nframes.min(1),
            ..UnwrapStats::default()
        };

        progress.start("unwrapping", nframes.saturating_sub(1));
        for frame in 1..nframes {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            for (atom, atom_shift) in shift.iter_mut().enumerate() {
                for &axis in &active {
                    let box_length = lengths[axis];
                    let previous = positions[[atom, frame - 1, axis]];
                    let mut current = positions[[atom, frame, axis]] + atom_shift[axis];
                    let delta = current - previous;
                    if delta > box_length / 2.0 {
                        // jumped up through the lower face
                        atom_shift[axis] -= box_length;
                        current -= box_length;
                        stats.shifts += 1;
                    } else if delta < -box_length / 2.0 {
                        // jumped down through the upper face
                        atom_shift[axis] += box_length;
                        current += box_length;
                        stats.shifts += 1;
                    }
                    positions[[atom, frame, axis]] = current;
                }
            }
            stats.frames_done = frame + 1;
            progress.advance(frame);
        }
        progress.finish();
        stats
    }

    /// Unwrap a loaded trajectory, at most once.
    pub fn unwrap_trajectory(
        trajectory: &mut Trajectory,
        simulation_box: &SimulationBox,
        cancel: &CancellationToken,
        progress: &mut dyn Progress,
    ) -> Result<Outcome<UnwrapReport>> {
        if trajectory.periodic_state() != PeriodicState::Wrapped {
            return Err(MsdError::AlreadyUnwrapped);
        }

        let mut lengths = simulation_box.lengths();
        let mut disabled_axes = Vec::new();
        for (axis, length) in lengths.iter_mut().enumerate() {
            if !(length.is_finite() && *length > 0.0) {
                log::warn!(
                    "Box length {length} on axis {} is not positive; unwrapping disabled for this axis",
                    AXIS_NAMES[axis]
                );
                disabled_axes.push(AXIS_NAMES[axis]);
                *length = 0.0;
            }
        }

        let stats = unwrap_positions(trajectory.positions_mut(), &lengths, cancel, progress);
        if stats.cancelled {
            log::warn!(
                "Unwrapping cancelled after {} of {} frames; trajectory is inconsistent",
                stats.frames_done,
                trajectory.nframes()
            );
            trajectory.set_periodic_state(PeriodicState::PartiallyUnwrapped {
                frames_done: stats.frames_done,
            });
            return Ok(Outcome::Cancelled);
        }

        trajectory.set_periodic_state(PeriodicState::Unwrapped);
        log::info!(
            "Unwrapped {} frames with box lengths {:?}, {} boundary crossings corrected",
            stats.frames_done,
            lengths,
            stats.shifts
        );
        Ok(Outcome::Complete(UnwrapReport {
            simulation_box: *simulation_box,
            disabled_axes,
            shifts: stats.shifts,
        }))
    }
}
