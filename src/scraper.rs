//! Article fetching and readable-text extraction.
//!
//! Uses reqwest for fetching and scraper for HTML parsing. Extraction is
//! selector-based: well-known content containers are tried first, then
//! substantial paragraphs from the whole page. Any failure along the way
//! (network, HTTP status, empty page) collapses into [`Fetched::Unavailable`]
//! so the caller can reply without charging a use.

use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;

use crate::content::Fetched;

/// Some sites serve bot-looking clients an empty shell; a browser user agent
/// keeps them talking. Shared with the transcript fetcher.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default timeout for HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on extracted article text, in characters. Keeps prompts inside
/// the model's context window for unboundedly long pages.
const MAX_ARTICLE_CHARS: usize = 20_000;

#[derive(Error, Debug)]
enum ArticleError {
    #[error("failed to fetch URL: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("no content found at URL")]
    NoContent,
}

/// Create a configured HTTP client for scraping
fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Fetch a URL and return its readable text, or [`Fetched::Unavailable`] when
/// the page can't be retrieved or contains nothing worth summarizing.
pub async fn fetch_article(url: &str) -> Fetched {
    match try_fetch(url).await {
        Ok(text) => Fetched::Text(text),
        Err(err) => {
            log::debug!("article fetch failed for {url}: {err}");
            Fetched::Unavailable
        }
    }
}

async fn try_fetch(url: &str) -> Result<String, ArticleError> {
    let client = create_client()?;

    let html = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let mut text = collapse_blank_lines(&extract_text(&Html::parse_document(&html)));
    cap_chars(&mut text, MAX_ARTICLE_CHARS);

    if text.trim().is_empty() {
        return Err(ArticleError::NoContent);
    }
    Ok(text)
}

/// Extract readable text content from the page
fn extract_text(document: &Html) -> String {
    // Try to find main content areas first
    let main_selectors = ["article", "main", "[role='main']", ".content", "#content"];

    for selector_str in main_selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                // Inside a trusted container even short lines are content.
                let fragment = Html::parse_fragment(&element.inner_html());
                let text = harvest(&fragment, 0);
                if !text.trim().is_empty() {
                    return text;
                }
            }
        }
    }

    // Fall back to the whole page; short fragments are almost always
    // navigation or chrome there.
    harvest(document, 20)
}

/// Collect headings, paragraphs, and list items in document order, dropping
/// anything at or under `min_chars` characters.
fn harvest(document: &Html, min_chars: usize) -> String {
    let content_selector = Selector::parse("h1, h2, h3, h4, p, li").unwrap();

    let mut paragraphs: Vec<String> = Vec::new();

    for element in document.select(&content_selector) {
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if !cleaned.is_empty() && cleaned.len() > min_chars {
            paragraphs.push(cleaned);
        }
    }

    paragraphs.join("\n\n")
}

/// Squash runs of blank lines down to a single blank line.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        out.push_str(line.trim_end());
        blank_run = 0;
    }
    out
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
fn cap_chars(text: &mut String, max_chars: usize) {
    if let Some((index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_article_container_over_page_chrome() {
        let html = r#"
            <html><body>
                <nav><p>Home News Sports Weather Subscribe Login</p></nav>
                <article>
                    <h1>The story headline</h1>
                    <p>First paragraph of the actual story body.</p>
                    <p>Second paragraph with the important details.</p>
                </article>
                <footer><p>Copyright and a lot of unrelated footer text here.</p></footer>
            </body></html>
        "#;
        let text = extract_text(&Html::parse_document(html));
        assert!(text.contains("The story headline"));
        assert!(text.contains("important details"));
        assert!(!text.contains("Subscribe"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn fallback_keeps_only_substantial_paragraphs() {
        let html = r#"
            <html><body>
                <div>
                    <p>Menu</p>
                    <p>This paragraph is comfortably longer than the cutoff and survives.</p>
                </div>
            </body></html>
        "#;
        let text = extract_text(&Html::parse_document(html));
        assert!(text.contains("comfortably longer"));
        assert!(!text.contains("Menu"));
    }

    #[test]
    fn blank_line_runs_collapse_to_one() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\nb"), "a\nb");
        assert_eq!(collapse_blank_lines("\n\na\n\n"), "a");
    }

    #[test]
    fn cap_respects_character_boundaries() {
        let mut text = "é".repeat(MAX_ARTICLE_CHARS + 50);
        cap_chars(&mut text, MAX_ARTICLE_CHARS);
        assert_eq!(text.chars().count(), MAX_ARTICLE_CHARS);

        let mut short = String::from("ok");
        cap_chars(&mut short, MAX_ARTICLE_CHARS);
        assert_eq!(short, "ok");
    }
}
