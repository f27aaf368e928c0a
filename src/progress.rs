/*
Progress reporting for the unwrap and MSD passes.

The core only talks to the `Progress` trait; the terminal front-end plugs in a
kdam (tqdm - rust version!) bar and library callers or tests use `Silent`.
 */

use kdam::{tqdm, Bar, BarExt};

pub trait Progress {
    fn start(&mut self, _label: &str, _total: usize) {}
    fn advance(&mut self, _done: usize) {}
    fn finish(&mut self) {}
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {}

/// Progress bar drawn on stderr.
#[derive(Default)]
pub struct TerminalProgress {
    bar: Option<Bar>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Progress for TerminalProgress {
    fn start(&mut self, label: &str, total: usize) {
        self.bar = Some(tqdm!(total = total, desc = label.to_string()));
    }

    fn advance(&mut self, done: usize) {
        if let Some(bar) = self.bar.as_mut() {
            if let Err(e) = bar.update_to(done) {
                log::debug!("progress bar update failed: {e}");
            }
        }
    }

    fn finish(&mut self) {
        if let Some(mut bar) = self.bar.take() {
            if let Err(e) = bar.refresh() {
                log::debug!("progress bar refresh failed: {e}");
            }
            eprintln!();
        }
    }
}
