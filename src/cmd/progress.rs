//! Spinners and progress bars for device fetches and cleanup actions

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for Graph fetches of unknown length
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Bar for retire/delete runs, one tick per device
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.cyan} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ");
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar
}

fn finish_with(bar: &ProgressBar, prefix: &'static str, template: &str, message: &str) {
    bar.set_style(
        ProgressStyle::default_spinner()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_prefix(prefix);
    bar.finish_with_message(message.to_string());
}

pub fn finish_spinner_success(spinner: &ProgressBar, message: &str) {
    finish_with(spinner, "✓", "{prefix:.green} {msg}", message);
}

pub fn finish_spinner_error(spinner: &ProgressBar, message: &str) {
    finish_with(spinner, "✗", "{prefix:.red} {msg}", message);
}

pub fn finish_progress_success(bar: &ProgressBar, message: &str) {
    finish_with(bar, "✓", "{prefix:.green} {msg}", message);
}

pub fn finish_progress_error(bar: &ProgressBar, message: &str) {
    finish_with(bar, "✗", "{prefix:.red} {msg}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_spinner() {
        let spinner = create_spinner("Fetching...");
        assert!(!spinner.is_finished());
        finish_spinner_success(&spinner, "Done");
        assert!(spinner.is_finished());
    }

    #[test]
    fn test_progress_bar_counts_devices() {
        let bar = create_progress_bar(4, "Retire devices");
        assert_eq!(bar.length(), Some(4));
        bar.inc(3);
        assert_eq!(bar.position(), 3);
        finish_progress_error(&bar, "1 failed");
        assert!(bar.is_finished());
    }
}
