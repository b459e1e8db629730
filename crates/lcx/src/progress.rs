// AI
//! 📊 progress.rs — "Are we there yet?" — every compaction job, every time, forever.
//!
//! 🚀 Three jobs live here:
//! - `ProgressMetrics`: shared, lock-free counters for one partition run, with an
//!   indicatif spinner on top so a human at a terminal sees something move
//! - `humanize_bytes` & friends: because "524288000 bytes" is a war crime in a log line
//! - `summary_table`: the comfy-table receipt printed when the job is done
//!
//! ⚠️ Watching the spinner will not make it go faster. Science says no.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use indicatif::{ProgressBar, ProgressStyle};

use crate::common::JobReport;

/// 📦 Bytes → "1.5 KB". 1024-based, one decimal, single-letter unit + "B".
///
/// Matches what operators already grep for in the dry-run logs: `512 B`, `3.0 MB`, `1.2 GB`.
pub fn humanize_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    // -- 🔢 KMGTPE: kilo through exa. if you need zetta, you need a different job.
    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, unit)
}

/// 🔢 Formats a number with commas. "1000000" → "1,000,000". You're welcome, eyes.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Counters for one partition run, shared by every worker.
///
/// Atomics, not a mutex: workers bump these on every object and we are not adding a
/// second lock to a pipeline whose whole design is "exactly one lock".
///
/// # Ancient Proverb
/// "He who compacts without a progress bar, compacts alone and in darkness."
pub(crate) struct ProgressMetrics {
    label: String,
    objects: AtomicU64,
    bytes: AtomicU64,
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("objects", &self.objects())
            .field("bytes", &self.bytes())
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Start a spinner for `label` (usually the partition name).
    ///
    /// indicatif hides itself when stderr isn't a terminal, so CI logs stay clean.
    pub(crate) fn new(label: impl Into<String>) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress_bar.enable_steady_tick(Duration::from_millis(250));
        let metrics = Self {
            label: label.into(),
            objects: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            progress_bar,
            start_time: Instant::now(),
        };
        metrics.render();
        metrics
    }

    /// 🔄 One more object decoded and buffered.
    pub(crate) fn record(&self, decoded_bytes: u64) {
        self.objects.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(decoded_bytes, Ordering::Relaxed);
        self.render();
    }

    pub(crate) fn objects(&self) -> u64 {
        self.objects.load(Ordering::Relaxed)
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 📈 Objects per second since the run started.
    pub(crate) fn rate(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.objects() as f64 / secs
        } else {
            0.0
        }
    }

    /// ✅ Done. Leave the last line on screen.
    pub(crate) fn finish(&self) {
        self.render();
        self.progress_bar.finish();
    }

    /// 💀 Failed. Freeze the line where it died.
    pub(crate) fn abandon(&self) {
        self.progress_bar.abandon();
    }

    fn render(&self) {
        self.progress_bar.set_message(format!(
            "{}: {} objects | {} decoded | {:.1} obj/s | {}",
            self.label,
            format_number(self.objects()),
            humanize_bytes(self.bytes()),
            self.rate(),
            format_duration(self.elapsed()),
        ));
    }
}

/// 🍽️ Build the end-of-job summary: one row per partition, plus a total.
pub fn summary_table(report: &JobReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "partition",
        "objects",
        "decoded",
        "bundles",
        if report.dry_run { "would upload" } else { "uploaded" },
        "elapsed",
    ]);

    let right = |text: String| Cell::new(text).set_alignment(CellAlignment::Right);
    for run in &report.runs {
        table.add_row(vec![
            Cell::new(&run.partition),
            right(format_number(run.objects_processed)),
            right(humanize_bytes(run.bytes_decoded)),
            right(run.bundles.len().to_string()),
            right(humanize_bytes(run.compressed_bytes())),
            right(format_duration(run.elapsed)),
        ]);
    }

    let total_elapsed: Duration = report.runs.iter().map(|r| r.elapsed).sum();
    table.add_row(vec![
        Cell::new("total"),
        right(format_number(report.objects_processed())),
        right(humanize_bytes(report.runs.iter().map(|r| r.bytes_decoded).sum())),
        right(report.bundle_count().to_string()),
        right(humanize_bytes(report.runs.iter().map(|r| r.compressed_bytes()).sum())),
        right(format_duration(total_elapsed)),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BundleReceipt, RunResult};

    #[test]
    fn the_one_where_bytes_get_a_haircut() {
        assert_eq!(humanize_bytes(0), "0 B");
        assert_eq!(humanize_bytes(1023), "1023 B");
        assert_eq!(humanize_bytes(1536), "1.5 KB");
        assert_eq!(humanize_bytes(500 * 1024 * 1024), "500.0 MB");
        assert_eq!(humanize_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(humanize_bytes(u64::MAX), "16.0 EB");
    }

    #[test]
    fn the_one_where_numbers_grow_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000_000), "1,000,000");
    }

    #[test]
    fn the_one_where_long_runs_earn_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_workers_share_a_scoreboard() {
        let the_metrics = ProgressMetrics::new("checkout-api");
        the_metrics.record(100);
        the_metrics.record(28);
        assert_eq!(the_metrics.objects(), 2);
        assert_eq!(the_metrics.bytes(), 128);
        the_metrics.finish();
    }

    #[test]
    fn the_one_where_the_receipt_lists_every_partition_and_a_total() {
        let the_report = JobReport {
            dry_run: true,
            runs: vec![RunResult {
                partition: "checkout-api".into(),
                objects_processed: 1_234,
                bytes_decoded: 2 * 1024 * 1024,
                bundles: vec![BundleReceipt {
                    key: "checkout-api/2024-01-01/aggregated_001.gz".into(),
                    uncompressed_bytes: 2 * 1024 * 1024,
                    compressed_bytes: 300 * 1024,
                    dry_run: true,
                }],
                elapsed: Duration::from_secs(3),
                first_error: None,
            }],
        };

        let the_rendered = summary_table(&the_report).to_string();
        assert!(the_rendered.contains("checkout-api"));
        assert!(the_rendered.contains("1,234"));
        assert!(the_rendered.contains("would upload"));
        assert!(the_rendered.contains("300.0 KB"));
        assert!(the_rendered.contains("total"));
    }
}
