/// Build a deep link to a message in a public group or channel:
/// `https://t.me/{username}/{msg_id}`.
///
/// A leading `@` on the username is dropped.
pub fn build_link(username: &str, message_id: i32) -> String {
    let uname = username.trim_start_matches('@');
    format!("https://t.me/{}/{}", uname, message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_link() {
        assert_eq!(build_link("mychannel", 42), "https://t.me/mychannel/42");
    }

    #[test]
    fn test_link_strips_at_sign() {
        assert_eq!(build_link("@mychannel", 7), "https://t.me/mychannel/7");
    }

    #[test]
    fn test_link_with_large_id() {
        assert_eq!(
            build_link("bigchat", 2_147_483_647),
            "https://t.me/bigchat/2147483647"
        );
    }
}
