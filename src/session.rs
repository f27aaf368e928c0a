/*
One analysis session per loaded trajectory.

    load  ->  unwrap (optional, at most once)  ->  MSD  ->  fit / plot window / export

Loading a new file resets everything. Unwrapping invalidates any MSD and fit
computed before it. A failed or cancelled request leaves earlier valid results
in place, so the caller may retry with other inputs without reloading.
 */

use crate::cancel::{CancellationToken, Outcome};
use crate::diffusion::{estimate, FitResult, TimeRange};
use crate::error::{MsdError, Result};
use crate::export::{export_msd_text, AnalysisReport};
use crate::msd::{compute_msd, MsdCurve, PlotWindow};
use crate::pbc::periodic_boundary_conditions::{
    unwrap_trajectory, AxisOverride, SimulationBox, UnwrapReport,
};
use crate::progress::Progress;
use crate::trajectory::Trajectory;

use std::path::Path;

#[derive(Debug, Default)]
pub struct Session {
    source: String,
    trajectory: Option<Trajectory>,
    unwrap_report: Option<UnwrapReport>,
    curve: Option<MsdCurve>,
    plot_window: Option<PlotWindow>,
    fit: Option<FitResult>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a trajectory file; on failure the previous session is kept as is.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<&Trajectory> {
        let path = path.as_ref();
        let trajectory = Trajectory::from_path(path)?;
        Ok(self.load(trajectory, path.display().to_string()))
    }

    pub fn load(&mut self, trajectory: Trajectory, source: impl Into<String>) -> &Trajectory {
        *self = Session {
            source: source.into(),
            ..Session::default()
        };
        self.trajectory.insert(trajectory)
    }

    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.trajectory.as_ref()
    }

    pub fn curve(&self) -> Option<&MsdCurve> {
        self.curve.as_ref()
    }

    pub fn fit(&self) -> Option<&FitResult> {
        self.fit.as_ref()
    }

    pub fn unwrap_report(&self) -> Option<&UnwrapReport> {
        self.unwrap_report.as_ref()
    }

    /// Box used for unwrapping: user bounds where given, detected extrema elsewhere.
    pub fn resolve_box(&self, overrides: &[AxisOverride; 3]) -> Result<SimulationBox> {
        let trajectory = self.trajectory.as_ref().ok_or(MsdError::NoTrajectory)?;
        Ok(SimulationBox::resolve(overrides, trajectory.bounding_box()))
    }

    pub fn unwrap_periodic(
        &mut self,
        overrides: &[AxisOverride; 3],
        cancel: &CancellationToken,
        progress: &mut dyn Progress,
    ) -> Result<Outcome<&UnwrapReport>> {
        let simulation_box = self.resolve_box(overrides)?;
        let trajectory = self.trajectory.as_mut().ok_or(MsdError::NoTrajectory)?;
        let outcome = unwrap_trajectory(trajectory, &simulation_box, cancel, progress)?;

        // coordinates changed, older results no longer describe them
        self.curve = None;
        self.plot_window = None;
        self.fit = None;

        Ok(match outcome {
            Outcome::Complete(report) => Outcome::Complete(&*self.unwrap_report.insert(report)),
            Outcome::Cancelled => Outcome::Cancelled,
        })
    }

    pub fn compute_msd(
        &mut self,
        cancel: &CancellationToken,
        progress: &mut dyn Progress,
    ) -> Result<Outcome<&MsdCurve>> {
        let trajectory = self.trajectory.as_ref().ok_or(MsdError::NoTrajectory)?;
        Ok(match compute_msd(trajectory, cancel, progress)? {
            Outcome::Complete(curve) => {
                self.plot_window = None;
                self.fit = None;
                Outcome::Complete(&*self.curve.insert(curve))
            }
            Outcome::Cancelled => Outcome::Cancelled,
        })
    }

    pub fn estimate(&mut self, range: &TimeRange) -> Result<&FitResult> {
        let curve = self.curve.as_ref().ok_or(MsdError::NoCurve)?;
        let fit = estimate(curve, range)?;
        Ok(self.fit.insert(fit))
    }

    pub fn plot_window(&mut self, x_start: Option<f64>, x_end: Option<f64>) -> Result<PlotWindow> {
        let curve = self.curve.as_ref().ok_or(MsdError::NoCurve)?;
        let window = curve
            .plot_window(x_start, x_end)
            .ok_or_else(|| MsdError::Range("the MSD curve is empty".to_string()))?;
        self.plot_window = Some(window);
        Ok(window)
    }

    pub fn export_msd(&self, path: impl AsRef<Path>) -> Result<()> {
        let curve = self.curve.as_ref().ok_or(MsdError::NoCurve)?;
        export_msd_text(curve, path)
    }

    pub fn report(&self) -> Result<AnalysisReport<'_>> {
        let trajectory = self.trajectory.as_ref().ok_or(MsdError::NoTrajectory)?;
        Ok(AnalysisReport {
            source: self.source.clone(),
            natoms: trajectory.natoms(),
            nframes: trajectory.nframes(),
            periodic_state: trajectory.periodic_state(),
            unwrap: self.unwrap_report.as_ref(),
            msd: self.curve.as_ref(),
            plot_window: self.plot_window,
            fit: self.fit.as_ref(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Silent;
    use crate::trajectory::PeriodicState;
    use approx::assert_relative_eq;

    /// One particle drifting +1 per frame along x in a box of length 10.
    fn drifting_particle(nframes: usize) -> String {
        let mut text = String::new();
        for frame in 0..nframes {
            let x = (0.5 + frame as f64).rem_euclid(10.0);
            text.push_str(&format!("1\nTime = {}\nAr {x} 5 5\n", frame * 2));
        }
        text
    }

    fn loaded(nframes: usize) -> Session {
        let mut session = Session::new();
        let trajectory: Trajectory = drifting_particle(nframes).parse().unwrap();
        session.load(trajectory, "drift.xyz");
        session
    }

    fn scratch_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("msdiff-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn box_of_ten() -> [AxisOverride; 3] {
        [AxisOverride {
            min: Some(0.0),
            max: Some(10.0),
        }; 3]
    }

    #[test]
    fn unwrapped_drift_gives_ballistic_msd() {
        let mut session = loaded(25);
        let token = CancellationToken::new();
        let report = session
            .unwrap_periodic(&box_of_ten(), &token, &mut Silent)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.shifts, 2);

        let curve = session.compute_msd(&token, &mut Silent).unwrap().completed().unwrap();
        assert_eq!(curve.len(), 24);
        for (index, point) in curve.points().iter().enumerate() {
            let lag = (index + 1) as f64;
            assert_relative_eq!(point.time, 2.0 * lag);
            assert_relative_eq!(point.value, lag * lag, epsilon = 1e-9);
        }
    }

    #[test]
    fn requests_need_earlier_stages() {
        let mut session = Session::new();
        let token = CancellationToken::new();
        assert!(matches!(
            session.compute_msd(&token, &mut Silent),
            Err(MsdError::NoTrajectory)
        ));
        let mut session = loaded(5);
        assert!(matches!(
            session.estimate(&TimeRange::full()),
            Err(MsdError::NoCurve)
        ));
        assert!(matches!(session.plot_window(None, None), Err(MsdError::NoCurve)));
    }

    #[test]
    fn failed_fit_keeps_previous_result() {
        let mut session = loaded(12);
        let token = CancellationToken::new();
        session
            .unwrap_periodic(&box_of_ten(), &token, &mut Silent)
            .unwrap();
        session.compute_msd(&token, &mut Silent).unwrap();

        let first = *session.estimate(&TimeRange::full()).unwrap();
        let err = session.estimate(&TimeRange::new(Some(10.0), Some(4.0))).unwrap_err();
        assert!(matches!(err, MsdError::Range(_)));
        assert_eq!(session.fit(), Some(&first));
    }

    #[test]
    fn cancelled_unwrap_blocks_msd() {
        let mut session = loaded(6);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = session
            .unwrap_periodic(&box_of_ten(), &token, &mut Silent)
            .unwrap();
        assert!(outcome.is_cancelled());
        assert!(matches!(
            session.trajectory().unwrap().periodic_state(),
            PeriodicState::PartiallyUnwrapped { .. }
        ));

        let fresh = CancellationToken::new();
        assert!(matches!(
            session.compute_msd(&fresh, &mut Silent),
            Err(MsdError::InconsistentTrajectory)
        ));
        assert!(matches!(
            session.unwrap_periodic(&box_of_ten(), &fresh, &mut Silent),
            Err(MsdError::AlreadyUnwrapped)
        ));
    }

    #[test]
    fn cancelled_msd_keeps_previous_curve() {
        let mut session = loaded(6);
        session
            .compute_msd(&CancellationToken::new(), &mut Silent)
            .unwrap();
        let before = session.curve().cloned();

        let token = CancellationToken::new();
        token.cancel();
        let outcome = session.compute_msd(&token, &mut Silent).unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(session.curve().cloned(), before);
    }

    #[test]
    fn auto_detected_box_is_reported() {
        let session = loaded(4);
        let sim_box = session
            .resolve_box(&[AxisOverride::default(); 3])
            .unwrap();
        assert_eq!(sim_box.x_dimension.min, 0.5);
        assert_eq!(sim_box.x_dimension.max, 3.5);
        // y and z never move, so those axes have zero length
        assert_eq!(sim_box.y_dimension.length(), 0.0);
    }

    #[test]
    fn report_reflects_session() {
        let mut session = loaded(5);
        session
            .compute_msd(&CancellationToken::new(), &mut Silent)
            .unwrap();
        let report = session.report().unwrap();
        assert_eq!(report.source, "drift.xyz");
        assert_eq!(report.nframes, 5);
        assert_eq!(report.msd.map(MsdCurve::len), Some(4));
        assert!(report.fit.is_none());
    }

    #[test]
    fn failed_load_keeps_previous_session() {
        let good = scratch_file("good.xyz", &drifting_particle(12));
        let bad = scratch_file("bad.xyz", "1\nt = 0\nAr 0 abc 0\n");

        let mut session = Session::new();
        let token = CancellationToken::new();
        let trajectory = session.load_path(&good).unwrap();
        assert_eq!((trajectory.natoms(), trajectory.nframes()), (1, 12));
        session
            .unwrap_periodic(&box_of_ten(), &token, &mut Silent)
            .unwrap();
        session.compute_msd(&token, &mut Silent).unwrap();
        session.estimate(&TimeRange::full()).unwrap();

        let positions = session.trajectory().unwrap().positions().clone();
        let curve = session.curve().cloned();
        let fit = session.fit().copied();

        let err = session.load_path(&bad).unwrap_err();
        assert!(matches!(err, MsdError::Format { line: 3, .. }), "{err}");
        let trajectory = session.trajectory().unwrap();
        assert_eq!(trajectory.positions(), &positions);
        assert_eq!(trajectory.periodic_state(), PeriodicState::Unwrapped);
        assert_eq!(session.curve().cloned(), curve);
        assert_eq!(session.fit().copied(), fit);
        assert_eq!(session.report().unwrap().source, good.display().to_string());

        let missing = std::env::temp_dir().join("msdiff-no-such-file.xyz");
        assert!(matches!(session.load_path(&missing), Err(MsdError::Io { .. })));

        std::fs::remove_file(good).unwrap();
        std::fs::remove_file(bad).unwrap();
    }

    #[test]
    fn exported_curve_reads_back_from_disk() {
        let mut session = loaded(6);
        session
            .compute_msd(&CancellationToken::new(), &mut Silent)
            .unwrap();
        let path = std::env::temp_dir().join(format!("msdiff-{}-msd.dat", std::process::id()));
        session.export_msd(&path).unwrap();

        let back = crate::export::import_msd_text(&path).unwrap();
        assert_eq!(Some(&back), session.curve());
        std::fs::remove_file(path).unwrap();
    }
}
