use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::collector::directory::CandidateGroup;
use crate::collector::history::HistorySource;

use super::scanner::scan_group;
use super::{MatchRecord, ProgressSink, ScanLimits, ScanProgress};

/// Aggregation state for one orchestration pass.
struct ScanSession {
    keyword: String,
    target: usize,
    found: Vec<MatchRecord>,
    groups_done: usize,
    groups_total: usize,
}

impl ScanSession {
    /// Append a finished group's matches, never past the target.
    fn absorb(&mut self, matches: Vec<MatchRecord>) {
        let room = self.target.saturating_sub(self.found.len());
        self.found.extend(matches.into_iter().take(room));
        self.groups_done += 1;
    }

    fn is_complete(&self) -> bool {
        self.found.len() >= self.target
    }

    fn progress(&self, group: &str) -> ScanProgress {
        ScanProgress {
            keyword: self.keyword.clone(),
            group: group.to_string(),
            groups_done: self.groups_done,
            groups_total: self.groups_total,
            links_found: self.found.len(),
        }
    }
}

/// Scan `candidates` for `keyword`, at most `limits.concurrency_cap` at a
/// time, until `limits.global_target` links are found, the time budget
/// runs out, or the candidates are exhausted.
///
/// Each scan starts with the still-missing link count as its budget. Links
/// are aggregated in the order scans finish and the result never holds more
/// than the target. Scans that would start after the deadline are skipped.
pub async fn orchestrate(
    history: Arc<dyn HistorySource>,
    keyword: &str,
    candidates: Vec<CandidateGroup>,
    limits: &ScanLimits,
    progress: &dyn ProgressSink,
) -> Vec<MatchRecord> {
    let mut session = ScanSession {
        keyword: keyword.to_string(),
        target: limits.global_target,
        found: Vec::new(),
        groups_done: 0,
        groups_total: candidates.len(),
    };
    if candidates.is_empty() || session.is_complete() {
        return session.found;
    }

    let deadline = Instant::now() + limits.time_budget;
    let claimed = Arc::new(AtomicUsize::new(0));
    let semaphore = Arc::new(Semaphore::new(limits.concurrency_cap.max(1)));
    let mut join_set = JoinSet::new();

    for group in candidates {
        let sem = Arc::clone(&semaphore);
        let claimed = Arc::clone(&claimed);
        let history = Arc::clone(&history);
        let keyword = keyword.to_string();
        let target = limits.global_target;
        let history_limit = limits.history_limit;

        join_set.spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return (group, Vec::new());
            };
            let budget = target.saturating_sub(claimed.load(Ordering::SeqCst));
            if budget == 0 || Instant::now() >= deadline {
                log::debug!("Skipping @{}: target met or time is up", group.username);
                return (group, Vec::new());
            }
            let matches = scan_group(
                history.as_ref(),
                &group,
                &keyword,
                budget,
                history_limit,
                deadline,
            )
            .await;
            claimed.fetch_add(matches.len(), Ordering::SeqCst);
            (group, matches)
        });
    }

    while let Some(join_result) = join_set.join_next().await {
        let (group, matches) = match join_result {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Scan task panicked: {}", e);
                session.groups_done += 1;
                continue;
            }
        };

        session.absorb(matches);
        progress.report(&session.progress(&group.username)).await;

        if session.is_complete() {
            log::info!(
                "Link target {} reached for '{}' after {}/{} groups",
                session.target,
                keyword,
                session.groups_done,
                session.groups_total
            );
            join_set.abort_all();
            break;
        }
    }

    if !session.is_complete() && Instant::now() >= deadline {
        log::info!(
            "Time budget elapsed for '{}' with {}/{} links",
            keyword,
            session.found.len(),
            session.target
        );
    }

    session.found
}
