use crate::collector::history::{HistoryMessage, MediaKind};

use super::MatchedVia;

/// Decide whether `msg` matches. `needle` must already be lowercase.
///
/// Only photos, videos and documents qualify. The caption is tried before
/// the file name.
pub fn match_message(msg: &HistoryMessage, needle: &str) -> Option<MatchedVia> {
    match msg.media {
        Some(MediaKind::Photo) | Some(MediaKind::Video) | Some(MediaKind::Document) => {}
        _ => return None,
    }

    if contains_folded(msg.caption.as_deref(), needle) {
        return Some(MatchedVia::Caption);
    }
    if contains_folded(msg.file_name.as_deref(), needle) {
        return Some(MatchedVia::Filename);
    }
    None
}

fn contains_folded(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|text| text.to_lowercase().contains(needle))
        .unwrap_or(false)
}
