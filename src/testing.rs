//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::bot::{BotError, Messenger};
use crate::collector::directory::{CandidateGroup, Directory};
use crate::collector::history::{HistoryMessage, HistorySource, MediaKind, MessageStream};
use crate::collector::CollectorError;
use crate::scan::{ProgressSink, ScanProgress};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `count` photos whose caption contains `keyword`, ids counting down from
/// `count` like a newest-first history.
pub fn matching_messages(count: usize, keyword: &str) -> Vec<HistoryMessage> {
    (0..count)
        .map(|i| HistoryMessage {
            id: (count - i) as i32,
            caption: Some(format!("{} #{}", keyword, count - i)),
            media: Some(MediaKind::Photo),
            file_name: None,
        })
        .collect()
}

pub fn text_message(id: i32, text: &str) -> HistoryMessage {
    HistoryMessage {
        id,
        caption: Some(text.to_string()),
        media: None,
        file_name: None,
    }
}

#[derive(Default)]
pub struct StubDirectory {
    groups: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl StubDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: &str, usernames: &[&str]) -> Self {
        self.groups.insert(
            keyword.to_string(),
            usernames.iter().map(|u| u.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, keyword: &str) -> Self {
        self.failing.insert(keyword.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Directory for StubDirectory {
    async fn lookup(
        &self,
        keyword: &str,
        _limit: usize,
    ) -> Result<Vec<CandidateGroup>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(keyword) {
            return Err(CollectorError::Api("stub lookup failure".to_string()));
        }
        Ok(self
            .groups
            .get(keyword)
            .map(|names| names.iter().map(|n| CandidateGroup::named(n)).collect())
            .unwrap_or_default())
    }
}

/// Directory whose lookup panics, standing in for an unexpected fault.
pub struct PanickingDirectory;

#[async_trait]
impl Directory for PanickingDirectory {
    async fn lookup(
        &self,
        _keyword: &str,
        _limit: usize,
    ) -> Result<Vec<CandidateGroup>, CollectorError> {
        panic!("unexpected directory response");
    }
}

#[derive(Clone, Default)]
struct StubGroup {
    messages: Vec<HistoryMessage>,
    fail_open: bool,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct StubHistory {
    groups: HashMap<String, StubGroup>,
    opened: Mutex<Vec<String>>,
}

impl StubHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, username: &str, messages: Vec<HistoryMessage>) -> Self {
        self.groups.insert(
            username.to_string(),
            StubGroup {
                messages,
                ..Default::default()
            },
        );
        self
    }

    /// Every message of this group takes `delay` to arrive.
    pub fn slow_group(mut self, username: &str, messages: Vec<HistoryMessage>, delay: Duration) -> Self {
        self.groups.insert(
            username.to_string(),
            StubGroup {
                messages,
                delay: Some(delay),
                ..Default::default()
            },
        );
        self
    }

    pub fn forbidden_group(mut self, username: &str) -> Self {
        self.groups.insert(
            username.to_string(),
            StubGroup {
                fail_open: true,
                ..Default::default()
            },
        );
        self
    }

    /// Yields `messages`, then fails on the next fetch.
    pub fn broken_group(mut self, username: &str, messages: Vec<HistoryMessage>) -> Self {
        let fail_after = Some(messages.len());
        self.groups.insert(
            username.to_string(),
            StubGroup {
                messages,
                fail_after,
                ..Default::default()
            },
        );
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySource for StubHistory {
    async fn open(
        &self,
        group: &CandidateGroup,
        limit: usize,
    ) -> Result<Box<dyn MessageStream>, CollectorError> {
        self.opened.lock().unwrap().push(group.username.clone());
        let stub = self.groups.get(&group.username).cloned().unwrap_or_default();
        if stub.fail_open {
            return Err(CollectorError::Api("CHANNEL_PRIVATE".to_string()));
        }
        Ok(Box::new(StubStream {
            messages: stub.messages.into_iter().take(limit).collect(),
            position: 0,
            fail_after: stub.fail_after,
            delay: stub.delay,
        }))
    }
}

struct StubStream {
    messages: Vec<HistoryMessage>,
    position: usize,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

#[async_trait]
impl MessageStream for StubStream {
    async fn next_message(&mut self) -> Result<Option<HistoryMessage>, CollectorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_after == Some(self.position) {
            return Err(CollectorError::Api("connection reset".to_string()));
        }
        let next = self.messages.get(self.position).cloned();
        self.position += 1;
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat_id: i64, text: String },
    Edit { chat_id: i64, message_id: i32, text: String },
    File { chat_id: i64, path: PathBuf },
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI32,
    file_delay: Option<Duration>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload takes `delay` before it is recorded.
    pub fn with_file_delay(mut self, delay: Duration) -> Self {
        self.file_delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of every send and edit, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } | Sent::Edit { text, .. } => Some(text),
                Sent::File { .. } => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, BotError> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), BotError> {
        self.sent.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_file(&self, chat_id: i64, path: &Path, _caption: &str) -> Result<(), BotError> {
        if let Some(delay) = self.file_delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(Sent::File {
            chat_id,
            path: path.to_path_buf(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    reports: Mutex<Vec<ScanProgress>>,
}

impl RecordingProgress {
    pub fn reports(&self) -> Vec<ScanProgress> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, progress: &ScanProgress) {
        self.reports.lock().unwrap().push(progress.clone());
    }
}
