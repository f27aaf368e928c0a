/*
Export of results

The MSD curve is written as plain text, one `"{time} {value}"` pair per line,
which plotting tools read directly and which `read_msd_text` reads back to the
same pairs. The JSON report collects everything one analysis produced.
 */

use crate::diffusion::FitResult;
use crate::error::{MsdError, Result};
use crate::msd::{MsdCurve, MsdPoint, PlotWindow};
use crate::pbc::periodic_boundary_conditions::UnwrapReport;
use crate::trajectory::PeriodicState;

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

fn text_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .from_writer(writer)
}

fn text_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

pub fn write_msd_text<W: Write>(curve: &MsdCurve, writer: W) -> Result<()> {
    let mut out = text_writer(writer);
    for point in curve.points() {
        out.serialize(point)?;
    }
    out.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn read_msd_text<R: Read>(reader: R) -> Result<MsdCurve> {
    let mut input = text_reader(reader);
    let points = input
        .deserialize::<MsdPoint>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(MsdCurve::new(points))
}

pub fn export_msd_text(curve: &MsdCurve, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| MsdError::io(path, e))?;
    write_msd_text(curve, BufWriter::new(file))?;
    log::info!("Wrote {} MSD values to {}", curve.len(), path.display());
    Ok(())
}

pub fn import_msd_text(path: impl AsRef<Path>) -> Result<MsdCurve> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MsdError::io(path, e))?;
    read_msd_text(BufReader::new(file))
}

/// Everything produced for one trajectory, as written by `--report`.
#[derive(Debug, Serialize)]
pub struct AnalysisReport<'a> {
    pub source: String,
    pub natoms: usize,
    pub nframes: usize,
    pub periodic_state: PeriodicState,
    pub unwrap: Option<&'a UnwrapReport>,
    pub msd: Option<&'a MsdCurve>,
    pub plot_window: Option<PlotWindow>,
    pub fit: Option<&'a FitResult>,
}

impl AnalysisReport<'_> {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| MsdError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|e| MsdError::io(path, e))?;
        log::info!("Wrote analysis report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_export_round_trips() {
        let curve = MsdCurve::new(vec![
            MsdPoint {
                time: 1.0,
                value: 0.1,
            },
            MsdPoint {
                time: 2.5,
                value: 1.0 / 3.0,
            },
            MsdPoint {
                time: 1e6,
                value: 12345.678901234567,
            },
        ]);
        let mut buffer = Vec::new();
        write_msd_text(&curve, &mut buffer).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("1.0 0.1\n"));

        let back = read_msd_text(buffer.as_slice()).unwrap();
        assert_eq!(back, curve);
    }

    #[test]
    fn reads_hand_written_pairs() {
        let curve = read_msd_text("10 0.5\n20 1.25\n".as_bytes()).unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve.points()[1].time, 20.0);
        assert_eq!(curve.points()[1].value, 1.25);
    }

    #[test]
    fn rejects_non_numeric_text() {
        assert!(matches!(
            read_msd_text("1 abc\n".as_bytes()),
            Err(MsdError::Export(_))
        ));
    }

    #[test]
    fn report_serializes_to_json() {
        let curve = MsdCurve::new(vec![MsdPoint {
            time: 1.0,
            value: 2.0,
        }]);
        let report = AnalysisReport {
            source: "traj.xyz".to_string(),
            natoms: 1,
            nframes: 2,
            periodic_state: PeriodicState::Wrapped,
            unwrap: None,
            msd: Some(&curve),
            plot_window: None,
            fit: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["natoms"], 1);
        assert_eq!(json["msd"]["points"][0]["value"], 2.0);
        assert!(json["fit"].is_null());
    }
}
