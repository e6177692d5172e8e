//! Progress reporting for sync runs.

use indicatif::{ProgressBar, ProgressStyle};

/// Per-file progress bar for a sync run. Length is set by the engine once
/// the scan completes.
pub fn sync_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files")
            .expect("valid progress template")
            .progress_chars("=> "),
    );
    bar
}
