//! Terminal progress feedback for transfers
//!
//! A spinner on stderr showing records moved and throughput. Totals are
//! rarely known up front (cursors and files are read lazily), so a bar is
//! only drawn when the caller supplies one.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress tracker for a running transfer
pub struct ProgressTracker {
    start_time: Instant,
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total` - Total number of records if known
    /// * `enable_bar` - Whether to draw anything at all
    pub fn new(total: Option<u64>, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = match total {
                Some(n) => {
                    let bar = ProgressBar::new(n);
                    if let Ok(style) = ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    {
                        bar.set_style(style.progress_chars("#>-"));
                    }
                    bar
                }
                None => {
                    let bar = ProgressBar::new_spinner();
                    if let Ok(style) =
                        ProgressStyle::default_spinner().template("{spinner:.green} {pos} records {msg}")
                    {
                        bar.set_style(style);
                    }
                    bar
                }
            };
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar
        });

        Self {
            start_time: Instant::now(),
            bar,
        }
    }

    /// A tracker that draws nothing
    pub fn hidden() -> Self {
        Self::new(None, false)
    }

    /// Record the total number of records moved so far
    pub fn update(&self, count: u64) {
        if let Some(ref bar) = self.bar {
            bar.set_position(count);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = count as f64 / elapsed;
                bar.set_message(format!("({:.0} records/sec)", speed));
            }
        }
    }

    /// Finish and clear the progress display
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
