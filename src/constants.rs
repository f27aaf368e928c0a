pub const DIMENSIONS: usize = 3; // x, y, z
pub const EINSTEIN_FACTOR: f64 = 6.0; // MSD = 2 * DIMENSIONS * D * t
pub const MIN_FIT_POINTS: usize = 3; // k, q and a need at least three points
pub const SIMPLEX_MAX_ITERS: u64 = 20_000; // Nelder-Mead iteration cap for the power-law fit
pub const SIMPLEX_SD_TOLERANCE: f64 = 1e-12; // spread of vertex costs at convergence
pub const RANGE_REL_TOLERANCE: f64 = 1e-9; // slack on fit window bounds, relative to the larger bound
pub const LINEAR_FIT_EPS: f64 = 1e-12; // singular value cut-off for the least squares solve
pub const PROGRESS_STRIDE: usize = 10; // particles between progress updates
