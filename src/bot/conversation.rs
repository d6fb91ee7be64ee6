use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::collector::directory::{search_groups, CandidateGroup, Directory};
use crate::collector::history::HistorySource;
use crate::scan::orchestrator::orchestrate;
use crate::scan::{MatchRecord, ProgressSink, ScanLimits, ScanProgress};

use super::{BotError, Messenger, Requester};

// Telegram caps a text message at 4096 characters.
const MAX_MESSAGE_LEN: usize = 4096;

/// Bounds of one interaction with a requester.
#[derive(Debug, Clone)]
pub struct ConversationLimits {
    /// Candidate groups per directory lookup.
    pub max_groups: usize,
    /// Replacement keywords a requester may send.
    pub max_retries: usize,
    /// How long a retry prompt waits for an answer.
    pub reply_timeout: Duration,
}

impl Default for ConversationLimits {
    fn default() -> Self {
        ConversationLimits {
            max_groups: 50,
            max_retries: 3,
            reply_timeout: Duration::from_secs(300),
        }
    }
}

/// Collaborators and limits shared by every conversation.
pub struct SearchServices {
    pub directory: Arc<dyn Directory>,
    pub history: Arc<dyn HistorySource>,
    pub scan: ScanLimits,
    pub limits: ConversationLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingInitialQuery,
    DirectoryLookup,
    AwaitingRetryKeyword,
    Scanning,
    Succeeded,
    SucceededPartial,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::SucceededPartial | Phase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NoGroups,
    NoMatches,
    NoReply,
}

/// What a finished conversation reports to its caller.
#[derive(Debug, Clone)]
pub struct ConversationReport {
    pub phase: Phase,
    pub failure: Option<FailureReason>,
    pub keyword: String,
    pub retries_used: usize,
    pub links: Vec<String>,
    /// Every phase entered, in order.
    pub trail: Vec<Phase>,
}

struct ConversationState {
    requester: Requester,
    current_keyword: String,
    retries_used: usize,
    accumulated: Vec<MatchRecord>,
    scanned_groups: HashSet<String>,
    phase: Phase,
    trail: Vec<Phase>,
    failure: Option<FailureReason>,
}

impl ConversationState {
    fn enter(&mut self, phase: Phase) {
        log::debug!(
            "Conversation {:?}: {:?} -> {:?}",
            self.requester,
            self.phase,
            phase
        );
        self.phase = phase;
        self.trail.push(phase);
    }

    fn fail(&mut self, reason: FailureReason) {
        self.failure = Some(reason);
        self.enter(Phase::Failed);
    }

    fn accumulate(&mut self, found: Vec<MatchRecord>) {
        for record in found {
            let duplicate = self
                .accumulated
                .iter()
                .any(|r| r.group == record.group && r.message_id == record.message_id);
            if !duplicate {
                self.accumulated.push(record);
            }
        }
    }
}

/// One requester's search, from first keyword to final summary.
///
/// Follow-up keywords arrive on `replies`; the dispatcher owns the sending
/// side and drops it when the conversation ends.
pub struct Conversation {
    services: Arc<SearchServices>,
    messenger: Arc<dyn Messenger>,
    replies: mpsc::Receiver<String>,
    state: ConversationState,
    status_message: Option<i32>,
}

impl Conversation {
    pub fn new(
        services: Arc<SearchServices>,
        messenger: Arc<dyn Messenger>,
        requester: Requester,
        keyword: &str,
        replies: mpsc::Receiver<String>,
    ) -> Self {
        Conversation {
            services,
            messenger,
            replies,
            state: ConversationState {
                requester,
                current_keyword: keyword.trim().to_string(),
                retries_used: 0,
                accumulated: Vec::new(),
                scanned_groups: HashSet::new(),
                phase: Phase::AwaitingInitialQuery,
                trail: vec![Phase::AwaitingInitialQuery],
                failure: None,
            },
            status_message: None,
        }
    }

    /// Drive the state machine to a terminal phase and send the summary.
    pub async fn run(mut self) -> Result<ConversationReport, BotError> {
        let chat_id = self.state.requester.chat_id;
        let greeting = format!(
            "🔍 Searching for groups matching '{}'...",
            self.state.current_keyword
        );
        self.status_message = Some(self.messenger.send_text(chat_id, &greeting).await?);

        let mut candidates = Vec::new();
        self.state.enter(Phase::DirectoryLookup);

        while !self.state.phase.is_terminal() {
            match self.state.phase {
                Phase::DirectoryLookup => {
                    candidates = self.lookup().await;
                    if !candidates.is_empty() {
                        self.state.enter(Phase::Scanning);
                    } else if self.can_retry() {
                        let prompt = format!(
                            "⚠️ No groups found for '{}'. Please enter another keyword ({} left):",
                            self.state.current_keyword,
                            self.retries_left()
                        );
                        self.prompt(&prompt).await;
                        self.state.enter(Phase::AwaitingRetryKeyword);
                    } else if !self.state.accumulated.is_empty() {
                        // Links from an earlier keyword still count.
                        self.state.enter(Phase::SucceededPartial);
                    } else {
                        self.state.fail(FailureReason::NoGroups);
                    }
                }
                Phase::AwaitingRetryKeyword => match self.await_keyword().await {
                    Some(keyword) => {
                        self.state.retries_used += 1;
                        log::info!(
                            "Requester {:?} retry {}/{} with '{}'",
                            self.state.requester,
                            self.state.retries_used,
                            self.services.limits.max_retries,
                            keyword
                        );
                        self.state.current_keyword = keyword;
                        self.update_status(&format!(
                            "🔍 Searching for groups matching '{}'...",
                            self.state.current_keyword
                        ))
                        .await;
                        self.state.enter(Phase::DirectoryLookup);
                    }
                    None if self.state.accumulated.is_empty() => {
                        self.state.fail(FailureReason::NoReply)
                    }
                    None => self.state.enter(Phase::SucceededPartial),
                },
                Phase::Scanning => {
                    self.scan(std::mem::take(&mut candidates)).await;
                    let target = self.services.scan.global_target;
                    if self.state.accumulated.len() >= target {
                        self.state.enter(Phase::Succeeded);
                    } else if self.can_retry() {
                        let prompt = format!(
                            "📂 Found {} of {} links. Send another keyword to search more groups ({} left):",
                            self.state.accumulated.len(),
                            target,
                            self.retries_left()
                        );
                        self.prompt(&prompt).await;
                        self.state.enter(Phase::AwaitingRetryKeyword);
                    } else if !self.state.accumulated.is_empty() {
                        self.state.enter(Phase::SucceededPartial);
                    } else {
                        self.state.fail(FailureReason::NoMatches);
                    }
                }
                Phase::AwaitingInitialQuery
                | Phase::Succeeded
                | Phase::SucceededPartial
                | Phase::Failed => break,
            }
        }

        self.finish().await?;

        Ok(ConversationReport {
            phase: self.state.phase,
            failure: self.state.failure,
            keyword: self.state.current_keyword.clone(),
            retries_used: self.state.retries_used,
            links: self.state.accumulated.iter().map(MatchRecord::link).collect(),
            trail: self.state.trail.clone(),
        })
    }

    fn can_retry(&self) -> bool {
        self.state.retries_used < self.services.limits.max_retries
    }

    fn retries_left(&self) -> usize {
        self.services
            .limits
            .max_retries
            .saturating_sub(self.state.retries_used)
    }

    // Groups scanned earlier in this conversation are not offered again.
    async fn lookup(&self) -> Vec<CandidateGroup> {
        let mut groups = search_groups(
            self.services.directory.as_ref(),
            &self.state.current_keyword,
            self.services.limits.max_groups,
        )
        .await;
        groups.retain(|g| {
            !self
                .state
                .scanned_groups
                .contains(&g.username.to_lowercase())
        });
        groups
    }

    async fn scan(&mut self, candidates: Vec<CandidateGroup>) {
        for group in &candidates {
            self.state
                .scanned_groups
                .insert(group.username.to_lowercase());
        }

        let already = self.state.accumulated.len();
        let limits = ScanLimits {
            global_target: self.services.scan.global_target.saturating_sub(already),
            ..self.services.scan.clone()
        };
        let progress = StatusProgress {
            messenger: Arc::clone(&self.messenger),
            chat_id: self.state.requester.chat_id,
            message_id: self.status_message,
            already_found: already,
        };

        let found = orchestrate(
            Arc::clone(&self.services.history),
            &self.state.current_keyword,
            candidates,
            &limits,
            &progress,
        )
        .await;
        self.state.accumulate(found);
    }

    async fn prompt(&mut self, text: &str) {
        // Anything sent before the prompt was not an answer to it.
        while let Ok(stale) = self.replies.try_recv() {
            log::debug!(
                "Dropping message from {:?} sent before prompt: {}",
                self.state.requester,
                stale
            );
        }
        self.update_status(text).await;
    }

    async fn await_keyword(&mut self) -> Option<String> {
        let timeout = self.services.limits.reply_timeout;
        loop {
            match tokio::time::timeout(timeout, self.replies.recv()).await {
                Ok(Some(text)) => {
                    let keyword = text.trim();
                    if !keyword.is_empty() {
                        return Some(keyword.to_string());
                    }
                }
                Ok(None) => return None,
                Err(_) => {
                    log::info!("No reply from {:?} within {:?}", self.state.requester, timeout);
                    return None;
                }
            }
        }
    }

    async fn update_status(&self, text: &str) {
        let chat_id = self.state.requester.chat_id;
        if let Some(message_id) = self.status_message {
            if let Err(e) = self.messenger.edit_text(chat_id, message_id, text).await {
                log::error!("Failed to update message: {}", e);
            }
        }
    }

    async fn finish(&mut self) -> Result<(), BotError> {
        let chat_id = self.state.requester.chat_id;
        let summary = match self.state.failure {
            Some(FailureReason::NoGroups) => {
                vec!["❌ Can't search your query. No groups found.".to_string()]
            }
            Some(FailureReason::NoMatches) => vec!["❌ No results found.".to_string()],
            Some(FailureReason::NoReply) => {
                vec!["❌ No keyword received, search cancelled.".to_string()]
            }
            None => {
                let links: Vec<String> =
                    self.state.accumulated.iter().map(MatchRecord::link).collect();
                let header = format!("✅ Found {} results:\n", links.len());
                split_message(&header, &links, MAX_MESSAGE_LEN)
            }
        };

        let mut chunks = summary.into_iter();
        if let Some(first) = chunks.next() {
            let edited = match self.status_message {
                Some(message_id) => self.messenger.edit_text(chat_id, message_id, &first).await,
                None => Err(BotError::Telegram("no status message".to_string())),
            };
            if let Err(e) = edited {
                log::warn!("Final edit failed ({}), sending a new message", e);
                self.messenger.send_text(chat_id, &first).await?;
            }
        }
        for chunk in chunks {
            self.messenger.send_text(chat_id, &chunk).await?;
        }

        log::info!(
            "Conversation with {:?} ended {:?}: {} links, {} retries",
            self.state.requester,
            self.state.phase,
            self.state.accumulated.len(),
            self.state.retries_used
        );
        Ok(())
    }
}

/// Edits the status message as groups finish scanning.
struct StatusProgress {
    messenger: Arc<dyn Messenger>,
    chat_id: i64,
    message_id: Option<i32>,
    already_found: usize,
}

#[async_trait]
impl ProgressSink for StatusProgress {
    async fn report(&self, progress: &ScanProgress) {
        let Some(message_id) = self.message_id else {
            return;
        };
        let text = format!(
            "📂 Checking for '{}' in {}/{} groups... {} links so far",
            progress.keyword,
            progress.groups_done,
            progress.groups_total,
            self.already_found + progress.links_found
        );
        if let Err(e) = self.messenger.edit_text(self.chat_id, message_id, &text).await {
            log::error!("Failed to update message: {}", e);
        }
    }
}

/// Pack `header` and newline-separated `lines` into messages of at most
/// `max_len` characters. The header opens the first message.
fn split_message(header: &str, lines: &[String], max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = header.to_string();
    for line in lines {
        if !current.is_empty()
            && current.chars().count() + 1 + line.chars().count() > max_len
        {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
