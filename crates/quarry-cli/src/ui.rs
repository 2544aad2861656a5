//! Console output.
//!
//! Progress goes to stderr so that `--json` output on stdout stays parseable.

use std::path::Path;

use quarry_core::{Aggregate, Reporter};
use quarry_schema::SpecTuple;

/// Reporter that writes indented progress lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    /// Print one line per indexed or fetched package.
    pub verbose: bool,
}

impl ConsoleReporter {
    /// Reporter with the given verbosity.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        eprintln!();
        eprintln!("  {title}");
    }

    fn indexed(&self, tuple: &SpecTuple, current: usize, total: usize) {
        if self.verbose {
            eprintln!("  [{current}/{total}] {}", tuple.basename());
        }
    }

    fn skipped(&self, path: &Path, reason: &str) {
        eprintln!("  skipped {}: {reason}", path.display());
    }

    fn aggregate(&self, aggregate: Aggregate, entries: usize, fresh: bool) {
        let source = if fresh { "fetched" } else { "kept" };
        eprintln!("  {:<12}{entries} entries ({source})", aggregate.as_str());
    }

    fn fetched(&self, tuple: &SpecTuple, bytes: u64, current: usize, total: usize) {
        if self.verbose {
            eprintln!("  [{current}/{total}] {} {}", tuple.basename(), format_size(bytes));
        }
    }

    fn failed(&self, tuple: &SpecTuple, reason: &str) {
        eprintln!("  failed {}: {reason}", tuple.basename());
    }

    fn info(&self, msg: &str) {
        eprintln!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("  warning: {msg}");
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        eprintln!();
        eprintln!("  {count} {action} in {elapsed_secs:.1}s");
    }
}

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_scale_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
