use std::collections::HashSet;

use async_trait::async_trait;
use grammers_client::Client;
use grammers_session::defs::{PeerAuth, PeerId, PeerRef};
use grammers_tl_types as tl;

use super::CollectorError;

/// A public group or channel returned by directory search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateGroup {
    /// Public username; doubles as the identifier used in links.
    pub username: String,
    pub channel_id: i64,
    pub access_hash: Option<i64>,
    pub title: String,
}

impl CandidateGroup {
    /// Candidate known only by username (tests, manual lookups).
    pub fn named(username: &str) -> Self {
        CandidateGroup {
            username: username.to_string(),
            channel_id: 0,
            access_hash: None,
            title: username.to_string(),
        }
    }

    /// Address the channel without a username round-trip.
    pub fn peer_ref(&self) -> PeerRef {
        PeerRef {
            id: PeerId::channel(self.channel_id),
            auth: PeerAuth::from_hash(self.access_hash.unwrap_or(0)),
        }
    }
}

/// Remote keyword lookup over public groups and channels.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn lookup(&self, keyword: &str, limit: usize)
        -> Result<Vec<CandidateGroup>, CollectorError>;
}

/// Search the directory for groups matching `keyword`.
///
/// Never fails: remote errors are logged and reported as "no groups".
/// The result holds at most `limit` groups with distinct usernames, in the
/// order the directory returned them.
pub async fn search_groups(
    directory: &dyn Directory,
    keyword: &str,
    limit: usize,
) -> Vec<CandidateGroup> {
    let groups = match directory.lookup(keyword, limit).await {
        Ok(groups) => groups,
        Err(e) => {
            log::error!("Directory search for '{}' failed: {}", keyword, e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let candidates: Vec<CandidateGroup> = groups
        .into_iter()
        .filter(|g| !g.username.is_empty())
        .filter(|g| seen.insert(g.username.to_lowercase()))
        .take(limit)
        .collect();

    log::info!(
        "Directory search for '{}' returned {} groups",
        keyword,
        candidates.len()
    );
    candidates
}

/// `contacts.search` through the user-account client.
pub struct GrammersDirectory {
    client: Client,
}

impl GrammersDirectory {
    pub fn new(client: Client) -> Self {
        GrammersDirectory { client }
    }
}

#[async_trait]
impl Directory for GrammersDirectory {
    async fn lookup(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<CandidateGroup>, CollectorError> {
        let request = tl::functions::contacts::Search {
            q: keyword.to_string(),
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
        };
        let tl::enums::contacts::Found::Found(found) = self
            .client
            .invoke(&request)
            .await
            .map_err(|e| CollectorError::Api(format!("contacts search error: {}", e)))?;

        Ok(candidates_from_chats(found.chats))
    }
}

/// Keep the public channels and supergroups; users and private chats
/// cannot be linked to.
fn candidates_from_chats(chats: Vec<tl::enums::Chat>) -> Vec<CandidateGroup> {
    chats
        .into_iter()
        .filter_map(|chat| match chat {
            tl::enums::Chat::Channel(channel) => {
                let username =
                    public_username(channel.username.as_deref(), channel.usernames.as_deref())?;
                Some(CandidateGroup {
                    username,
                    channel_id: channel.id,
                    access_hash: channel.access_hash,
                    title: channel.title,
                })
            }
            _ => None,
        })
        .collect()
}

/// The main username, or the first active one for channels that only
/// carry collectible usernames.
fn public_username(
    username: Option<&str>,
    usernames: Option<&[tl::enums::Username]>,
) -> Option<String> {
    if let Some(username) = username {
        return Some(username.to_string());
    }
    usernames?.iter().find_map(|entry| {
        let tl::enums::Username::Username(entry) = entry;
        entry.active.then(|| entry.username.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubDirectory;

    #[tokio::test]
    async fn test_search_limits_and_dedupes() {
        let directory = StubDirectory::new()
            .with("foo", &["alpha", "beta", "Alpha", "gamma", "delta"]);

        let groups = search_groups(&directory, "foo", 3).await;
        let names: Vec<&str> = groups.iter().map(|g| g.username.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_search_failure_is_empty() {
        let directory = StubDirectory::new().failing("foo");
        assert!(search_groups(&directory, "foo", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_idempotent() {
        let directory = StubDirectory::new().with("foo", &["g1", "g2"]);
        let first = search_groups(&directory, "foo", 10).await;
        let second = search_groups(&directory, "foo", 10).await;
        assert_eq!(first, second);
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_keyword_is_empty() {
        let directory = StubDirectory::new().with("foo", &["g1"]);
        assert!(search_groups(&directory, "bar", 10).await.is_empty());
    }

    #[test]
    fn test_peer_ref_from_candidate() {
        let group = CandidateGroup {
            username: "testchat".to_string(),
            channel_id: 1234567890,
            access_hash: Some(12345),
            title: "Test".to_string(),
        };
        let pr = group.peer_ref();
        assert_eq!(pr.id.bare_id(), 1234567890);
        assert_eq!(pr.auth.hash(), 12345);
    }

    fn collectible(username: &str, active: bool) -> tl::enums::Username {
        tl::enums::Username::Username(tl::types::Username {
            editable: false,
            active,
            username: username.to_string(),
        })
    }

    #[test]
    fn test_public_username_prefers_main() {
        let extra = [collectible("other", true)];
        assert_eq!(
            public_username(Some("main"), Some(&extra)),
            Some("main".to_string())
        );
    }

    #[test]
    fn test_public_username_falls_back_to_active_collectible() {
        let extra = [collectible("sold", false), collectible("nft_chat", true)];
        assert_eq!(
            public_username(None, Some(&extra)),
            Some("nft_chat".to_string())
        );
        assert_eq!(public_username(None, Some(&extra[..1])), None);
        assert_eq!(public_username(None, None), None);
    }
}
