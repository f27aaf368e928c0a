/*
Diffusion coefficient from the MSD curve

Two models are fitted over the selected lag-time window:

    MSD(t) = k * t^a + q        (non-linear, Nelder-Mead on the squared residuals)
    MSD(t) = k_lin * t + b      (ordinary least squares)

The exponent a says how close the window is to normal diffusion (a = 1). The
diffusion coefficient itself always comes from the linear slope through the
3-D Einstein relation MSD = 6 D t, whatever a turned out to be. Both fits are
reported.
 */

use crate::constants::{
    EINSTEIN_FACTOR, LINEAR_FIT_EPS, MIN_FIT_POINTS, RANGE_REL_TOLERANCE, SIMPLEX_MAX_ITERS,
    SIMPLEX_SD_TOLERANCE,
};
use crate::error::{MsdError, Result};
use crate::msd::MsdCurve;

use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::neldermead::NelderMead;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::fmt;

/// Requested fit window; `None` means "use the curve's own bound".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeRange {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl TimeRange {
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        TimeRange { start, end }
    }

    pub fn full() -> Self {
        TimeRange::default()
    }
}

/// Window actually fitted. `*_defaulted` marks a bound that was missing or
/// unreadable, `*_clamped` one that lay outside the curve and was pulled in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ResolvedRange {
    pub start: f64,
    pub end: f64,
    pub start_defaulted: bool,
    pub end_defaulted: bool,
    pub start_clamped: bool,
    pub end_clamped: bool,
}

impl ResolvedRange {
    /// Lag times are differences of timestamps and carry rounding error, so
    /// both bounds get a small relative slack.
    fn tolerance(&self) -> f64 {
        RANGE_REL_TOLERANCE * self.start.abs().max(self.end.abs()).max(1.0)
    }

    /// Inclusive membership test used to select the fitted points.
    pub fn contains(&self, time: f64) -> bool {
        let tol = self.tolerance();
        time >= self.start - tol && time <= self.end + tol
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FitResult {
    /// Exponent `a` of `k * t^a + q`.
    pub exponent: f64,
    /// Offset `q` of `k * t^a + q`.
    pub intercept: f64,
    /// Prefactor `k` of `k * t^a + q`.
    pub scale: f64,
    /// Slope `k_lin` of the straight-line fit.
    pub slope: f64,
    pub linear_intercept: f64,
    /// `k_lin / 6`
    pub diffusion_coefficient: f64,
    pub range: ResolvedRange,
    pub points: usize,
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fitting polynomial kx^a + q over [{}, {}]: a = {:.4}, Diffusion = {:.4}",
            self.range.start, self.range.end, self.exponent, self.diffusion_coefficient
        )
    }
}

/// Clamp the requested window to the curve's lag-time domain.
///
/// Missing or non-finite bounds default to the curve's first/last time; a
/// window that is empty after clamping is an error, the bounds are never swapped.
pub fn resolve_range(curve: &MsdCurve, requested: &TimeRange) -> Result<ResolvedRange> {
    let (Some(first), Some(last)) = (curve.first_time(), curve.last_time()) else {
        return Err(MsdError::NoCurve);
    };

    let tol = RANGE_REL_TOLERANCE * first.abs().max(last.abs()).max(1.0);

    let (start, start_defaulted, start_clamped) = match requested.start.filter(|v| v.is_finite()) {
        None => {
            log::warn!("No usable start time given; using default start {first}");
            (first, true, false)
        }
        Some(start) if start < first - tol => {
            log::warn!("Start time {start} is below the first lag time; using {first}");
            (first, false, true)
        }
        Some(start) => (start.max(first), false, false),
    };
    let (end, end_defaulted, end_clamped) = match requested.end.filter(|v| v.is_finite()) {
        None => {
            log::warn!("No usable end time given; using default end {last}");
            (last, true, false)
        }
        Some(end) if end > last + tol => {
            log::warn!("End time {end} is beyond the last lag time; using {last}");
            (last, false, true)
        }
        Some(end) => (end.min(last), false, false),
    };

    if start >= end {
        return Err(MsdError::Range(format!(
            "start {start} is not below end {end}"
        )));
    }

    Ok(ResolvedRange {
        start,
        end,
        start_defaulted,
        end_defaulted,
        start_clamped,
        end_clamped,
    })
}

/// Fit both models on the selected window and derive the diffusion coefficient.
pub fn estimate(curve: &MsdCurve, requested: &TimeRange) -> Result<FitResult> {
    let range = resolve_range(curve, requested)?;
    let (times, values): (Vec<f64>, Vec<f64>) = curve
        .points()
        .iter()
        .filter(|p| range.contains(p.time))
        .map(|p| (p.time, p.value))
        .unzip();

    let distinct = times.iter().dedup().count();
    if distinct < MIN_FIT_POINTS {
        return Err(MsdError::Fit(format!(
            "only {distinct} distinct points in [{}, {}], at least {MIN_FIT_POINTS} are needed",
            range.start, range.end
        )));
    }

    let (slope, linear_intercept) = linear_fit(&times, &values)?;
    let (scale, intercept, exponent) =
        power_law_fit(&times, &values, slope, linear_intercept, SIMPLEX_MAX_ITERS)?;
    let diffusion_coefficient = slope / EINSTEIN_FACTOR;

    log::info!(
        "Fit over [{}, {}] with {} points: a = {exponent:.6}, k_lin = {slope:.6e}, D = {diffusion_coefficient:.6e}",
        range.start,
        range.end,
        times.len()
    );

    Ok(FitResult {
        exponent,
        intercept,
        scale,
        slope,
        linear_intercept,
        diffusion_coefficient,
        range,
        points: times.len(),
    })
}

/// Degree-1 least squares, returns `(slope, intercept)`.
pub fn linear_fit(times: &[f64], values: &[f64]) -> Result<(f64, f64)> {
    let n = times.len();
    let design = DMatrix::from_fn(n, 2, |row, col| if col == 0 { times[row] } else { 1.0 });
    let rhs = DVector::from_column_slice(values);
    let solution = design
        .svd(true, true)
        .solve(&rhs, LINEAR_FIT_EPS)
        .map_err(|e| MsdError::Fit(format!("linear least squares failed: {e}")))?;
    if !solution.iter().all(|v| v.is_finite()) {
        return Err(MsdError::Fit("linear least squares gave a non-finite slope".to_string()));
    }
    Ok((solution[0], solution[1]))
}

/*
The simplex works on a rescaled problem, y / y_scale = k' * (t / t_scale)^a + q',
so that the tolerances do not depend on the units of the trajectory.
 */
struct PowerLawProblem<'a> {
    times: &'a [f64],
    values: &'a [f64],
}

impl CostFunction for PowerLawProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let (k, q, a) = (param[0], param[1], param[2]);
        let sum: f64 = self
            .times
            .iter()
            .zip(self.values)
            .map(|(t, y)| {
                let r = k * t.powf(a) + q - y;
                r * r
            })
            .sum();
        // negative times with a fractional exponent give NaN
        Ok(if sum.is_finite() { sum } else { f64::INFINITY })
    }
}

/// Returns `(k, q, a)` of `k * t^a + q`, started from the straight-line fit.
/// Reaching `max_iters` counts as a failure to converge.
fn power_law_fit(
    times: &[f64],
    values: &[f64],
    slope: f64,
    offset: f64,
    max_iters: u64,
) -> Result<(f64, f64, f64)> {
    let t_scale = scale_of(times);
    let y_scale = scale_of(values);
    let scaled_times: Vec<f64> = times.iter().map(|t| t / t_scale).collect();
    let scaled_values: Vec<f64> = values.iter().map(|y| y / y_scale).collect();

    let start = vec![slope * t_scale / y_scale, offset / y_scale, 1.0];
    let mut simplex = vec![start.clone()];
    for i in 0..start.len() {
        let mut vertex = start.clone();
        vertex[i] += 0.1 * start[i].abs().max(1.0);
        simplex.push(vertex);
    }

    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(SIMPLEX_SD_TOLERANCE)
        .map_err(|e| MsdError::Fit(e.to_string()))?;
    let problem = PowerLawProblem {
        times: &scaled_times,
        values: &scaled_values,
    };
    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()
        .map_err(|e| MsdError::Fit(format!("power-law fit failed: {e}")))?;

    let state = result.state();
    if state.get_iter() >= max_iters {
        return Err(MsdError::Fit(format!(
            "power-law fit did not converge in {max_iters} iterations; try another time range"
        )));
    }
    let best = state
        .get_best_param()
        .ok_or_else(|| MsdError::Fit("power-law fit produced no parameters".to_string()))?;

    let a = best[2];
    let k = best[0] * y_scale / t_scale.powf(a);
    let q = best[1] * y_scale;
    if !(k.is_finite() && q.is_finite() && a.is_finite()) {
        return Err(MsdError::Fit("power-law fit diverged; try another time range".to_string()));
    }
    log::debug!("power-law fit took {} iterations", state.get_iter());
    Ok((k, q, a))
}

fn scale_of(values: &[f64]) -> f64 {
    let largest = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if largest > 0.0 {
        largest
    } else {
        1.0
    }
}
