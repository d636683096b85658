// file: src/pipeline/progress.rs
// description: per-task statistics and console rendering of progress events
// reference: uses indicatif for progress bars and tracks processing metrics

use crate::models::{EventPayload, ProgressEvent};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub queries_made: usize,
    pub items_downloaded: usize,
    pub items_described: usize,
    pub download_failed: bool,
    pub descriptions_aggregated: usize,
    pub batch_count: usize,
    pub duration_secs: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items_per_second(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        self.items_described as f64 / self.duration_secs as f64
    }

    /// Share of downloaded items that got a description
    pub fn success_rate(&self) -> f64 {
        if self.items_downloaded == 0 {
            return 0.0;
        }
        (self.items_described as f64 / self.items_downloaded as f64) * 100.0
    }
}

/// Renders the event stream of one task for the `run` command
pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
}

impl ProgressTracker {
    pub fn with_color(keyword: &str, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();

        let main_bar = create_spinner(&multi_progress, colored);
        main_bar.set_prefix(keyword.to_string());
        let detail_bar = create_detail_bar(&multi_progress);

        Self {
            main_bar,
            detail_bar,
        }
    }

    pub fn handle(&self, event: &ProgressEvent) {
        match &event.payload {
            EventPayload::Progress { message } => {
                self.main_bar.set_message(message.clone());
                self.main_bar.tick();
            }
            EventPayload::Connection { message } => {
                self.detail_bar.set_message(message.clone());
            }
            EventPayload::Summary { data } => {
                self.detail_bar.set_message(format!(
                    "{} sources aggregated",
                    data.sources.len()
                ));
                self.main_bar
                    .finish_with_message("Summary ready".green().to_string());
            }
            EventPayload::Error { error, .. } => {
                self.main_bar.abandon_with_message(error.red().to_string());
            }
        }
    }

    pub fn finish(&self) {
        if !self.main_bar.is_finished() {
            self.main_bar.finish_and_clear();
        }
        self.detail_bar.finish_and_clear();
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_spinner(multi_progress: &MultiProgress, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new_spinner());
    let template = if colored {
        "{spinner:.green} [{elapsed_precise}] {prefix:.cyan.bold} {msg}"
    } else {
        "{spinner} [{elapsed_precise}] {prefix} {msg}"
    };
    bar.set_style(
        ProgressStyle::default_spinner()
            .template(template)
            .expect("Failed to create progress bar template"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    let style = ProgressStyle::default_bar()
        .template("{msg}")
        .expect("Failed to create detail bar template");
    bar.set_style(style);
    bar
}
