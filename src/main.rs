//! -------------------------------------------------------------
//! msdiff: Mean Squared Displacement and Diffusion Coefficient
//! -------------------------------------------------------------
//!
//! 1. Load the trajectory file.
//! 2. With `--pbc`, unwrap periodic boundaries. Box bounds that are not given
//!    (or cannot be read) are taken from the extent of the coordinates.
//! 3. Compute the MSD over every time origin.
//! 4. Optionally print the plot window for `--x-start`/`--x-end`.
//! 5. Fit the diffusion coefficient over `--t-start`..`--t-end`. Look for the
//!    window that brings the exponent a closest to 1.0.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

use msdiff::config::{AnalysisConfig, UserValue};
use msdiff::pbc::periodic_boundary_conditions::BoundSource;
use msdiff::progress::{Progress, Silent, TerminalProgress};
use msdiff::{CancellationToken, Outcome, Session};

#[derive(Parser, Debug)]
#[command(name = "msdiff", version)]
#[command(about = "Computes Mean Squared Displacement and Diffusion Coefficient from a trajectory file", long_about = None)]
struct Args {
    /// Trajectory file: particle count line, optional timestamp header, `label x y z` lines
    trajectory: PathBuf,

    /// JSON file with analysis options; flags given here take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The trajectory uses periodic boundary conditions
    #[arg(long)]
    pbc: bool,

    /// Simulation box bounds; missing or unreadable values are auto-detected
    #[arg(long, allow_hyphen_values = true)]
    x_min: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    x_max: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    y_min: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    y_max: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    z_min: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    z_max: Option<String>,

    /// Beginning of the time interval for the diffusion fit
    #[arg(long, allow_hyphen_values = true)]
    t_start: Option<String>,

    /// End of the time interval for the diffusion fit
    #[arg(long, allow_hyphen_values = true)]
    t_end: Option<String>,

    /// Start of the x axis of a rescaled plot
    #[arg(long, allow_hyphen_values = true)]
    x_start: Option<String>,

    /// End of the x axis of a rescaled plot
    #[arg(long, allow_hyphen_values = true)]
    x_end: Option<String>,

    /// Write the MSD values as `time value` lines
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Write a JSON report of the whole analysis
    #[arg(long)]
    report: Option<PathBuf>,

    /// Do not draw progress bars
    #[arg(long)]
    no_progress: bool,

    /// Do not show warnings (decrease verbosity)
    #[arg(short, long, conflicts_with = "verbose")]
    muted: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<(AnalysisConfig, Args)> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_path(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };

        let text = |value: &Option<String>| value.as_deref().map(UserValue::from);
        config.periodic |= self.pbc;
        config.show_progress &= !self.no_progress;

        let bounds = &mut config.box_bounds;
        for (slot, flag) in [
            (&mut bounds.x_min, &self.x_min),
            (&mut bounds.x_max, &self.x_max),
            (&mut bounds.y_min, &self.y_min),
            (&mut bounds.y_max, &self.y_max),
            (&mut bounds.z_min, &self.z_min),
            (&mut bounds.z_max, &self.z_max),
        ] {
            if flag.is_some() {
                *slot = text(flag);
            }
        }
        for (slot, flag) in [
            (&mut config.t_start, &self.t_start),
            (&mut config.t_end, &self.t_end),
            (&mut config.x_start, &self.x_start),
            (&mut config.x_end, &self.x_end),
        ] {
            if flag.is_some() {
                *slot = text(flag);
            }
        }
        Ok((config, self))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.muted {
        LevelFilter::Error
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let (config, args) = args.into_config()?;
    let mut progress: Box<dyn Progress> = if config.show_progress {
        Box::new(TerminalProgress::new())
    } else {
        Box::new(Silent)
    };
    let cancel = CancellationToken::new();

    let mut session = Session::new();
    let trajectory = session
        .load_path(&args.trajectory)
        .with_context(|| format!("loading {}", args.trajectory.display()))?;
    println!(
        "Loaded {} particles over {} frames",
        trajectory.natoms(),
        trajectory.nframes()
    );

    if config.periodic {
        let overrides = config.box_bounds.overrides();
        let simulation_box = session.resolve_box(&overrides)?;
        for (name, bounds) in simulation_box.named_axes() {
            let source = |s: BoundSource| match s {
                BoundSource::User => "given",
                BoundSource::Detected => "detected",
            };
            println!(
                "Box {}: min {} ({}), max {} ({})",
                name.to_ascii_uppercase(),
                bounds.min,
                source(bounds.min_source),
                bounds.max,
                source(bounds.max_source)
            );
        }
        match session.unwrap_periodic(&overrides, &cancel, progress.as_mut())? {
            Outcome::Complete(report) => {
                for axis in &report.disabled_axes {
                    println!("Unwrapping disabled on axis {axis}: box length is not positive");
                }
            }
            Outcome::Cancelled => bail!("unwrapping was cancelled; the trajectory is inconsistent"),
        }
    }

    let curve = match session.compute_msd(&cancel, progress.as_mut())? {
        Outcome::Complete(curve) => curve,
        Outcome::Cancelled => bail!("MSD calculation was cancelled"),
    };
    println!("MSD computed for {} lag times", curve.len());

    if config.wants_plot_window() {
        let (x_start, x_end) = config.plot_range();
        match session.plot_window(x_start, x_end) {
            Ok(window) => println!(
                "Plot window: t in [{}, {}], MSD in [{}, {}]",
                window.x_start, window.x_end, window.y_start, window.y_end
            ),
            Err(e) => log::error!("MSD rescale error: {e}"),
        }
    }

    match session.estimate(&config.fit_range()) {
        Ok(fit) => println!("{fit}"),
        Err(e) => log::error!("Diffusion calculation error: {e}. Try another time range."),
    }

    if let Some(path) = &args.export {
        session
            .export_msd(path)
            .with_context(|| format!("exporting MSD to {}", path.display()))?;
    }
    if let Some(path) = &args.report {
        session
            .report()?
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    Ok(())
}
