use tokio::time::Instant;

use crate::collector::directory::CandidateGroup;
use crate::collector::history::HistorySource;
use crate::collector::CollectorError;

use super::matcher::match_message;
use super::MatchRecord;

/// Scan one group's history for media matching `keyword`.
///
/// Walks at most `history_limit` messages newest first and stops once
/// `link_budget` matches were collected. Each fetch races `deadline`; when
/// it passes, the matches collected so far are returned. Any history error
/// is logged and the group counts as having no matches.
pub async fn scan_group(
    history: &dyn HistorySource,
    group: &CandidateGroup,
    keyword: &str,
    link_budget: usize,
    history_limit: usize,
    deadline: Instant,
) -> Vec<MatchRecord> {
    match collect_matches(history, group, keyword, link_budget, history_limit, deadline).await {
        Ok(matches) => {
            log::info!(
                "Found {} matches for '{}' in @{}",
                matches.len(),
                keyword,
                group.username
            );
            matches
        }
        Err(e) => {
            log::warn!("Failed to scan @{}: {}", group.username, e);
            Vec::new()
        }
    }
}

async fn collect_matches(
    history: &dyn HistorySource,
    group: &CandidateGroup,
    keyword: &str,
    link_budget: usize,
    history_limit: usize,
    deadline: Instant,
) -> Result<Vec<MatchRecord>, CollectorError> {
    let mut matches = Vec::new();
    if link_budget == 0 || history_limit == 0 {
        return Ok(matches);
    }

    let needle = keyword.to_lowercase();
    let mut stream = history.open(group, history_limit).await?;
    let mut seen = 0;

    while seen < history_limit {
        let next = match tokio::time::timeout_at(deadline, stream.next_message()).await {
            Ok(next) => next?,
            Err(_) => {
                log::info!(
                    "Time budget elapsed while scanning @{} ({} matches so far)",
                    group.username,
                    matches.len()
                );
                break;
            }
        };
        let Some(msg) = next else {
            break;
        };
        seen += 1;

        if let Some(matched_via) = match_message(&msg, &needle) {
            matches.push(MatchRecord {
                group: group.username.clone(),
                message_id: msg.id,
                matched_via,
            });
        }
        if matches.len() >= link_budget {
            break;
        }
    }

    Ok(matches)
}
