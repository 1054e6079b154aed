//! Task output sink
//!
//! Concurrent build workers never write to stdout directly. Each task buffers
//! its process output and hands the whole block to the sink, which writes it
//! under a single lock so blocks from different tasks never interleave.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Shared, serialized destination for task output
#[derive(Clone)]
pub struct OutputSink {
    writer: SharedWriter,
    progress: bool,
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl OutputSink {
    /// Sink writing to any writer
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            progress: false,
        }
    }

    /// Sink writing to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Sink discarding everything
    pub fn discard() -> Self {
        Self::new(std::io::sink())
    }

    /// Enable or disable the build progress bar
    #[must_use]
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Progress bar for `total` build tasks; hidden when disabled
    pub fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} builds ({msg})")
        {
            pb.set_style(style.progress_chars("█▓▒░"));
        }
        pb
    }

    /// Write one task's output block atomically
    pub fn emit(&self, label: &str, output: &str) {
        let mut block = format!("==> {label}\n");
        if !output.is_empty() {
            block.push_str(output);
            if !output.ends_with('\n') {
                block.push('\n');
            }
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.write_all(block.as_bytes()).and_then(|()| writer.flush()) {
            tracing::warn!("Failed to write task output: {e}");
        }
    }
}
