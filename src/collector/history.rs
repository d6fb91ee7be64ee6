use async_trait::async_trait;
use grammers_client::types::Media;
use grammers_client::{Client, InvocationError};
use tokio::sync::mpsc;

use super::directory::CandidateGroup;
use super::CollectorError;

const PAGE_SIZE: usize = 100;
const MAX_FLOOD_RETRIES: usize = 2;

/// Kind of attachment a history message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    /// Stickers, polls, locations, web previews and the like.
    Other,
}

/// The parts of a history message the scanner looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: i32,
    /// Message text; for media messages this is the caption.
    pub caption: Option<String>,
    pub media: Option<MediaKind>,
    /// File name of an attached document, if it was uploaded with one.
    pub file_name: Option<String>,
}

/// Newest-first walk over one group's history.
#[async_trait]
pub trait MessageStream: Send {
    /// `Ok(None)` once the history (or the requested depth) is exhausted.
    async fn next_message(&mut self) -> Result<Option<HistoryMessage>, CollectorError>;
}

/// Opens message history streams for candidate groups.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn open(
        &self,
        group: &CandidateGroup,
        limit: usize,
    ) -> Result<Box<dyn MessageStream>, CollectorError>;
}

/// History through the user-account client.
pub struct GrammersHistory {
    client: Client,
}

impl GrammersHistory {
    pub fn new(client: Client) -> Self {
        GrammersHistory { client }
    }
}

#[async_trait]
impl HistorySource for GrammersHistory {
    async fn open(
        &self,
        group: &CandidateGroup,
        limit: usize,
    ) -> Result<Box<dyn MessageStream>, CollectorError> {
        let (tx, rx) = mpsc::channel(PAGE_SIZE);
        let client = self.client.clone();
        let group = group.clone();
        tokio::spawn(async move {
            pump_history(client, group, limit, tx).await;
        });
        Ok(Box::new(ChannelStream { rx }))
    }
}

/// Receiving end of a history pump. Dropping it stops the pump.
pub struct ChannelStream {
    rx: mpsc::Receiver<Result<HistoryMessage, CollectorError>>,
}

#[async_trait]
impl MessageStream for ChannelStream {
    async fn next_message(&mut self) -> Result<Option<HistoryMessage>, CollectorError> {
        match self.rx.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

// Fetches pages newest to oldest and forwards each message until `limit`
// messages were sent, the history ends, an error is forwarded, or the
// receiver goes away. FLOOD_WAIT sleeps and retries the same fetch.
async fn pump_history(
    client: Client,
    group: CandidateGroup,
    limit: usize,
    tx: mpsc::Sender<Result<HistoryMessage, CollectorError>>,
) {
    let mut iter = client.iter_messages(group.peer_ref());
    let mut fetched = 0;
    let mut flood_retries = 0;

    while fetched < limit {
        let item = match iter.next().await {
            Ok(Some(msg)) => {
                flood_retries = 0;
                let (media, file_name) = describe_media(msg.media());
                let text = msg.text();
                Ok(HistoryMessage {
                    id: msg.id(),
                    caption: (!text.is_empty()).then(|| text.to_string()),
                    media,
                    file_name,
                })
            }
            Ok(None) => break,
            Err(InvocationError::Rpc(rpc))
                if rpc.name == "FLOOD_WAIT" && flood_retries < MAX_FLOOD_RETRIES =>
            {
                let secs = rpc.value.unwrap_or(5);
                flood_retries += 1;
                log::warn!(
                    "FloodWait {} secs for @{}, retrying ({}/{})",
                    secs,
                    group.username,
                    flood_retries,
                    MAX_FLOOD_RETRIES
                );
                tokio::time::sleep(std::time::Duration::from_secs(secs as u64)).await;
                continue;
            }
            Err(InvocationError::Rpc(rpc)) if rpc.name == "FLOOD_WAIT" => {
                Err(CollectorError::FloodWait(rpc.value.unwrap_or(5)))
            }
            Err(e) => Err(CollectorError::Api(format!("message fetch error: {}", e))),
        };

        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
        fetched += 1;
    }
}

fn describe_media(media: Option<Media>) -> (Option<MediaKind>, Option<String>) {
    match media {
        None => (None, None),
        Some(Media::Photo(_)) => (Some(MediaKind::Photo), None),
        Some(Media::Document(doc)) => {
            let kind = match doc.mime_type() {
                Some(mime) if mime.starts_with("video/") => MediaKind::Video,
                _ => MediaKind::Document,
            };
            let name = doc.name();
            let file_name = (!name.is_empty()).then(|| name.to_string());
            (Some(kind), file_name)
        }
        Some(_) => (Some(MediaKind::Other), None),
    }
}
