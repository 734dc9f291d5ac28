use indicatif::{ProgressBar, ProgressStyle};

/// Hook for rendering download and extraction progress.
pub trait ProgressHandler: Send + Sync {
    /// Registers `bar` with the renderer and returns the bar to drive.
    fn add_progress_bar(&self, bar: ProgressBar) -> ProgressBar;

    /// Style used for byte based progress.
    fn default_bytes_style(&self) -> ProgressStyle {
        default_bytes_style()
    }
}

/// Hides all progress.
#[derive(Clone, Default)]
pub struct NoProgressHandler;

impl ProgressHandler for NoProgressHandler {
    fn add_progress_bar(&self, bar: ProgressBar) -> ProgressBar {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        bar
    }
}

/// Renders progress bars through an [`indicatif::MultiProgress`].
#[derive(Clone)]
pub struct MultiProgressHandler {
    multi_progress: indicatif::MultiProgress,
}

impl MultiProgressHandler {
    pub fn new(multi_progress: indicatif::MultiProgress) -> Self {
        Self { multi_progress }
    }
}

impl ProgressHandler for MultiProgressHandler {
    fn add_progress_bar(&self, bar: ProgressBar) -> ProgressBar {
        self.multi_progress.add(bar)
    }
}

pub fn default_bytes_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:<18} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━ ")
}
