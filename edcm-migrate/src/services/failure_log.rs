//! Failure log writer
//!
//! Lines accumulate in memory in arrival order and are written to two
//! plain-text files once at run end. Both files are overwritten, so a run
//! with no failures leaves two empty files behind.
//!
//! `flush` runs at most once. If the owning run unwinds before flushing
//! explicitly, `Drop` writes whatever was recorded.

use crate::models::failure::{FailureCounts, FailureRecord};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Generic failure log file name
pub const FAILURE_LOG_FILE: &str = "failed_items_output.txt";

/// Item-group-missing log file name
pub const ITEM_GROUP_LOG_FILE: &str = "output_log.txt";

/// Locations of the two failure logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLogPaths {
    pub failures: PathBuf,
    pub item_groups: PathBuf,
}

impl FailureLogPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            failures: dir.join(FAILURE_LOG_FILE),
            item_groups: dir.join(ITEM_GROUP_LOG_FILE),
        }
    }
}

/// Buffered failure logs for one run
#[derive(Debug)]
pub struct FailureLog {
    paths: FailureLogPaths,
    failure_lines: Vec<String>,
    item_group_lines: Vec<String>,
    counts: FailureCounts,
    flushed: bool,
}

impl FailureLog {
    pub fn new(paths: FailureLogPaths) -> Self {
        Self {
            paths,
            failure_lines: Vec::new(),
            item_group_lines: Vec::new(),
            counts: FailureCounts::default(),
            flushed: false,
        }
    }

    /// Append one incident to the log matching its kind
    pub fn record(&mut self, record: FailureRecord) {
        if self.flushed {
            warn!(line = %record.line, "Failure recorded after logs were flushed, dropping");
            return;
        }
        debug!(kind = ?record.kind, line = %record.line, "Failure recorded");
        self.counts.record(record.kind);
        if record.kind.is_item_group_missing() {
            self.item_group_lines.push(record.line);
        } else {
            self.failure_lines.push(record.line);
        }
    }

    pub fn counts(&self) -> FailureCounts {
        self.counts
    }

    /// Write both files, creating the output directory if needed
    ///
    /// Later calls are no-ops.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;

        for path in [&self.paths.failures, &self.paths.item_groups] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        write_lines(&self.paths.failures, &self.failure_lines)?;
        write_lines(&self.paths.item_groups, &self.item_group_lines)?;

        info!(
            failures = self.failure_lines.len(),
            item_group_failures = self.item_group_lines.len(),
            failure_log = %self.paths.failures.display(),
            item_group_log = %self.paths.item_groups.display(),
            "Failure logs written"
        );
        Ok(())
    }
}

impl Drop for FailureLog {
    fn drop(&mut self) {
        if !self.flushed {
            if let Err(e) = self.flush() {
                error!("Failed to write failure logs on drop: {}", e);
            }
        }
    }
}

fn write_lines(path: &Path, lines: &[String]) -> io::Result<()> {
    let mut file = io::BufWriter::new(fs::File::create(path)?);
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    file.flush()
}
