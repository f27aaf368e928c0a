/*

=========================================================
 Mean Squared Displacement & Diffusion Analysis (Rust)
=========================================================

Trajectory
----------
- Frames read from a coordinate listing: a particle count line, an optional
  header whose 3rd token is the timestamp, then `label x y z` per particle.
- Stored as position[particle][frame][axis].
- The bounding box of the raw coordinates is collected while reading.

Periodic Boundary Conditions (PBC)
----------------------------------
- Particles leaving the box re-enter on the opposite face.
- A jump larger than half a box length between two frames is undone by
  shifting the particle one box length from that frame onward.
- Box bounds come from the user, or from the bounding box when not given.

Mean Squared Displacement
-------------------------
- MSD(lag) = < |r(t + lag) - r(t)|^2 >, averaged over every particle and
  every available time origin t.
- O(natoms * nframes^2); this is where the time goes.

Diffusion
---------
- Power law fit  MSD = k t^a + q  for the exponent a (a = 1: normal diffusion)
- Linear fit     MSD = k_lin t + b
- Einstein relation in 3-D: D = k_lin / 6

=========================================================

*/

pub mod cancel;
pub mod config;
pub mod constants;
pub mod diffusion;
pub mod error;
pub mod export;
pub mod msd;
pub mod pbc;
pub mod progress;
pub mod session;
pub mod trajectory;

pub use cancel::{CancellationToken, Outcome};
pub use diffusion::{estimate, FitResult, TimeRange};
pub use error::{MsdError, Result};
pub use msd::{compute_msd, MsdCurve, MsdPoint, PlotWindow};
pub use pbc::periodic_boundary_conditions::{
    unwrap_trajectory, AxisOverride, SimulationBox, UnwrapReport,
};
pub use session::Session;
pub use trajectory::{BoundingBox, PeriodicState, Trajectory};
