pub mod matcher;
pub mod orchestrator;
pub mod scanner;

use std::time::Duration;

use async_trait::async_trait;

use crate::collector::link::build_link;

/// Which part of the message contained the keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedVia {
    Caption,
    Filename,
}

/// A media message whose caption or file name contains the keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub group: String,
    pub message_id: i32,
    pub matched_via: MatchedVia,
}

impl MatchRecord {
    pub fn link(&self) -> String {
        build_link(&self.group, self.message_id)
    }
}

/// Bounds for one orchestration pass.
#[derive(Debug, Clone)]
pub struct ScanLimits {
    /// Links wanted across all groups.
    pub global_target: usize,
    /// Wall-clock budget for the whole pass.
    pub time_budget: Duration,
    /// Scans allowed in flight at once.
    pub concurrency_cap: usize,
    /// History depth per group.
    pub history_limit: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        ScanLimits {
            global_target: 20,
            time_budget: Duration::from_secs(10 * 60),
            concurrency_cap: 5,
            history_limit: 500,
        }
    }
}

/// Emitted after each finished group scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub keyword: String,
    pub group: String,
    pub groups_done: usize,
    pub groups_total: usize,
    pub links_found: usize,
}

/// Receives progress of an orchestration pass. Purely advisory.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: &ScanProgress);
}

/// Sink that drops every report.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _progress: &ScanProgress) {}
}
