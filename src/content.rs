//! Classifies incoming messages into the three things the bot can summarize:
//! plain text, a YouTube video, or an article URL.
//!
//! Only messages that *start* with a URL are treated as links; a URL buried
//! mid-sentence means the user wants the surrounding text summarized.

/// What an incoming message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Free-form text to summarize as-is
    Plain,
    /// A YouTube video, carrying its video id
    Video(String),
    /// Any other URL, to be fetched and extracted
    Article(String),
}

/// Content fetched (or not) for a classified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Text(String),
    /// The source exists but yielded nothing usable (no captions, paywall,
    /// empty page). Not an internal error; the user gets a specific reply
    /// and is not charged a use.
    Unavailable,
}

/// Classify a message. Leading whitespace is ignored; the URL, if any, is the
/// first whitespace-delimited token.
pub fn classify(text: &str) -> Classified {
    let trimmed = text.trim();
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Classified::Plain;
    }

    let url = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_string();

    match video_id(&url) {
        Some(id) => Classified::Video(id),
        None => Classified::Article(url),
    }
}

/// Extract a YouTube video id from a URL, or None when it isn't a watchable
/// YouTube link. Handles `youtu.be/<id>` short links and
/// `youtube.com/watch?v=<id>` (any subdomain), with trailing query
/// parameters or fragments stripped.
fn video_id(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/')?;
    let host = host.split(':').next().unwrap_or(host);

    if host == "youtu.be" {
        let id = path.split(['?', '&', '#', '/']).next().unwrap_or("");
        return (!id.is_empty()).then(|| id.to_string());
    }

    if host == "youtube.com" || host.ends_with(".youtube.com") {
        let query = path.strip_prefix("watch?")?;
        for pair in query.split('&') {
            if let Some(id) = pair.strip_prefix("v=") {
                let id = id.split('#').next().unwrap_or(id);
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sentences_stay_plain() {
        assert_eq!(classify("summarize this meeting for me"), Classified::Plain);
        assert_eq!(classify(""), Classified::Plain);
    }

    #[test]
    fn url_mid_sentence_is_plain_text() {
        assert_eq!(
            classify("as seen on https://example.com this keeps happening"),
            Classified::Plain
        );
    }

    #[test]
    fn short_youtube_link() {
        assert_eq!(
            classify("https://youtu.be/abc123"),
            Classified::Video("abc123".to_string())
        );
    }

    #[test]
    fn watch_link_with_www() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=abc123"),
            Classified::Video("abc123".to_string())
        );
    }

    #[test]
    fn watch_link_with_extra_params() {
        assert_eq!(
            classify("https://m.youtube.com/watch?app=m&v=abc123&t=30s"),
            Classified::Video("abc123".to_string())
        );
    }

    #[test]
    fn short_link_with_query_and_fragment() {
        assert_eq!(
            classify("https://youtu.be/abc123?t=30#top"),
            Classified::Video("abc123".to_string())
        );
    }

    #[test]
    fn ordinary_urls_are_articles() {
        assert_eq!(
            classify("https://example.com/news/story"),
            Classified::Article("https://example.com/news/story".to_string())
        );
    }

    #[test]
    fn non_watch_youtube_pages_are_articles() {
        assert_eq!(
            classify("https://www.youtube.com/feed/subscriptions"),
            Classified::Article("https://www.youtube.com/feed/subscriptions".to_string())
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            classify("  https://youtu.be/abc123  "),
            Classified::Video("abc123".to_string())
        );
    }
}
