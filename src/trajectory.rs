/*
Trajectory storage

A trajectory file is a sequence of frames:

    N                       <- particle count for the frame
    <tag> <tag> <timestamp> <- optional header, timestamp is the 3rd token
    label x y z             <- exactly N coordinate lines
    ...

Positions are kept as a [natoms][nframes][3] array so that one particle's
whole track is contiguous; the MSD pass walks particle by particle. The
bounding box of the raw coordinates is reduced while scanning, it is the
best-effort guess of the periodic box when the user gives none.
 */

use crate::constants::DIMENSIONS;
use crate::error::{MsdError, Result};

use itertools::Itertools;
use nalgebra::Vector3;
use ndarray::{Array3, ArrayView2, Axis};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Per-axis extrema of every raw (wrapped) coordinate in the trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BoundingBox {
    fn empty() -> Self {
        BoundingBox {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    fn include(&mut self, point: &Vector3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn lengths(&self) -> Vector3<f64> {
        self.max - self.min
    }
}

/// How far the periodic unwrapping got on this trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PeriodicState {
    Wrapped,
    Unwrapped,
    /// Unwrapping was cancelled after `frames_done` frames; the data is inconsistent.
    PartiallyUnwrapped { frames_done: usize },
}

#[derive(Clone, Debug)]
pub struct Trajectory {
    positions: Array3<f64>,
    time: Vec<f64>,
    bounding_box: BoundingBox,
    periodic_state: PeriodicState,
}

impl Trajectory {
    /// Build a trajectory from an already materialised `[natoms, nframes, 3]` array.
    pub fn new(positions: Array3<f64>, time: Vec<f64>) -> Result<Self> {
        let (natoms, nframes, dims) = positions.dim();
        if dims != DIMENSIONS {
            return Err(MsdError::format(0, format!("expected 3 spatial axes, got {dims}")));
        }
        if natoms == 0 || nframes == 0 {
            return Err(MsdError::format(0, "trajectory has no particles or no frames"));
        }
        if time.len() != nframes {
            return Err(MsdError::format(
                0,
                format!("{} timestamps for {nframes} frames", time.len()),
            ));
        }
        check_increasing(&time, |_| 0)?;

        let mut bounding_box = BoundingBox::empty();
        for lane in positions.lanes(Axis(2)) {
            let point = Vector3::new(lane[0], lane[1], lane[2]);
            if !point.iter().all(|v| v.is_finite()) {
                return Err(MsdError::format(0, "non-finite coordinate"));
            }
            bounding_box.include(&point);
        }

        Ok(Trajectory {
            positions,
            time,
            bounding_box,
            periodic_state: PeriodicState::Wrapped,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| MsdError::io(path, e))?;
        log::info!("Reading trajectory from {}", path.display());
        Self::read(BufReader::new(file))
    }

    /// Parse frames from any buffered reader.
    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = NumberedLines::new(reader);
        let mut natoms: Option<usize> = None;
        let mut flat: Vec<f64> = Vec::new();
        let mut stamps: Vec<Option<f64>> = Vec::new();
        let mut frame_lines: Vec<usize> = Vec::new();
        let mut bounding_box = BoundingBox::empty();

        while let Some((count_line, text)) = lines.next_non_blank()? {
            let count = parse_count(count_line, &text)?;
            match natoms {
                None if count == 0 => {
                    return Err(MsdError::format(count_line, "frame declares zero particles"));
                }
                None => natoms = Some(count),
                Some(n) if n != count => {
                    return Err(MsdError::format(
                        count_line,
                        format!("frame declares {count} particles, earlier frames had {n}"),
                    ));
                }
                Some(_) => {}
            }

            // optional header line carrying the timestamp
            let mut stamp = None;
            if let Some((header_line, header)) = lines.next_line()? {
                let tokens: Vec<&str> = header.split_whitespace().collect();
                match tokens.len() {
                    3 => stamp = Some(parse_real(header_line, tokens[2], "timestamp")?),
                    4 => lines.push_back(header_line, header),
                    _ => log::debug!("line {header_line}: comment line without timestamp"),
                }
            }

            for read_so_far in 0..count {
                let Some((line_no, coords)) = lines.next_line()? else {
                    return Err(MsdError::format(
                        count_line,
                        format!("frame declares {count} particles but input ended after {read_so_far}"),
                    ));
                };
                let point = parse_coordinate(line_no, &coords, count, read_so_far)?;
                bounding_box.include(&point);
                flat.extend(point.iter());
            }

            stamps.push(stamp);
            frame_lines.push(count_line);
        }

        let Some(natoms) = natoms else {
            return Err(MsdError::format(lines.line_no, "input contains no frames"));
        };
        let nframes = stamps.len();
        let time = resolve_timestamps(&stamps, &frame_lines)?;
        check_increasing(&time, |frame| frame_lines[frame])?;

        let positions = Array3::from_shape_vec((nframes, natoms, DIMENSIONS), flat)
            .map_err(|e| MsdError::format(lines.line_no, e.to_string()))?
            .permuted_axes([1, 0, 2])
            .as_standard_layout()
            .into_owned();

        log::info!(
            "Loaded {nframes} frames of {natoms} particles, box extent {:?} .. {:?}",
            bounding_box.min.as_slice(),
            bounding_box.max.as_slice()
        );

        Ok(Trajectory {
            positions,
            time,
            bounding_box,
            periodic_state: PeriodicState::Wrapped,
        })
    }

    pub fn natoms(&self) -> usize {
        self.positions.dim().0
    }

    pub fn nframes(&self) -> usize {
        self.positions.dim().1
    }

    pub fn positions(&self) -> &Array3<f64> {
        &self.positions
    }

    /// The `[nframes, 3]` track of one particle.
    pub fn track(&self, particle: usize) -> ArrayView2<'_, f64> {
        self.positions.index_axis(Axis(0), particle)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn periodic_state(&self) -> PeriodicState {
        self.periodic_state
    }

    pub(crate) fn positions_mut(&mut self) -> &mut Array3<f64> {
        &mut self.positions
    }

    pub(crate) fn set_periodic_state(&mut self, state: PeriodicState) {
        self.periodic_state = state;
    }
}

impl FromStr for Trajectory {
    type Err = MsdError;

    fn from_str(s: &str) -> Result<Self> {
        Trajectory::read(s.as_bytes())
    }
}

/// Line reader that tracks 1-based line numbers and allows one line of look-back.
struct NumberedLines<R> {
    inner: std::io::Lines<R>,
    line_no: usize,
    pending: Option<(usize, String)>,
}

impl<R: BufRead> NumberedLines<R> {
    fn new(reader: R) -> Self {
        NumberedLines {
            inner: reader.lines(),
            line_no: 0,
            pending: None,
        }
    }

    fn next_line(&mut self) -> Result<Option<(usize, String)>> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        match self.inner.next() {
            None => Ok(None),
            Some(line) => {
                self.line_no += 1;
                let text = line.map_err(|e| MsdError::io("<trajectory stream>", e))?;
                Ok(Some((self.line_no, text)))
            }
        }
    }

    fn next_non_blank(&mut self) -> Result<Option<(usize, String)>> {
        while let Some((line_no, text)) = self.next_line()? {
            if !text.trim().is_empty() {
                return Ok(Some((line_no, text)));
            }
        }
        Ok(None)
    }

    fn push_back(&mut self, line_no: usize, text: String) {
        self.pending = Some((line_no, text));
    }
}

fn parse_count(line_no: usize, text: &str) -> Result<usize> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [count] => count.parse::<usize>().map_err(|_| {
            MsdError::format(line_no, format!("`{count}` is not a particle count"))
        }),
        [_, _, _, _] => Err(MsdError::format(
            line_no,
            "coordinate line found where a particle count was expected (more coordinate lines than declared)",
        )),
        _ => Err(MsdError::format(
            line_no,
            format!("expected a particle count, found `{}`", text.trim()),
        )),
    }
}

fn parse_coordinate(line_no: usize, text: &str, count: usize, read: usize) -> Result<Vector3<f64>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [_label, x, y, z] => Ok(Vector3::new(
            parse_real(line_no, x, "x coordinate")?,
            parse_real(line_no, y, "y coordinate")?,
            parse_real(line_no, z, "z coordinate")?,
        )),
        [single] if single.parse::<usize>().is_ok() => Err(MsdError::format(
            line_no,
            format!("frame declares {count} particles but only {read} coordinate lines were found"),
        )),
        _ => Err(MsdError::format(
            line_no,
            format!("expected `label x y z`, found {} columns", tokens.len()),
        )),
    }
}

fn parse_real(line_no: usize, token: &str, what: &str) -> Result<f64> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(MsdError::format(line_no, format!("{what} `{token}` is not a finite number"))),
    }
}

/// Every frame carries a timestamp, or none does (frame index is used then).
fn resolve_timestamps(stamps: &[Option<f64>], frame_lines: &[usize]) -> Result<Vec<f64>> {
    if stamps.iter().all(Option::is_none) {
        log::info!("No timestamps in trajectory, using frame index as time");
        return Ok((0..stamps.len()).map(|i| i as f64).collect());
    }
    stamps
        .iter()
        .enumerate()
        .map(|(frame, stamp)| {
            stamp.ok_or_else(|| {
                MsdError::format(
                    frame_lines[frame],
                    format!("frame {frame} has no timestamp while other frames do"),
                )
            })
        })
        .collect()
}

fn check_increasing(time: &[f64], line_of: impl Fn(usize) -> usize) -> Result<()> {
    if let Some((frame, (prev, next))) = time
        .iter()
        .tuple_windows()
        .enumerate()
        .find(|(_, (prev, next))| next <= prev)
    {
        return Err(MsdError::format(
            line_of(frame + 1),
            format!("timestamp {next} does not follow {prev}"),
        ));
    }
    Ok(())
}
