//! YouTube transcript fetching.
//!
//! No API key involved: the watch page embeds a list of caption tracks in its
//! player configuration. We slice that JSON array out of the page, pick the
//! best track (manual captions beat auto-generated ones, preferred languages
//! in order), then download and flatten the timed-text XML it points to.

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::content::Fetched;
use crate::scraper::BROWSER_USER_AGENT;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Default timeout for HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Caption languages we will summarize, best first.
const LANGUAGE_PREFERENCE: [&str; 4] = ["en", "en-US", "en-GB", "ru"];

#[derive(Error, Debug)]
enum TranscriptError {
    #[error("failed to fetch URL: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("caption track list is not valid JSON: {0}")]
    TrackParse(#[from] serde_json::Error),
    #[error("video has no caption tracks")]
    NoTracks,
    #[error("no caption track in a supported language")]
    NoPreferredLanguage,
    #[error("caption payload contained no text")]
    EmptyPayload,
}

/// One entry of the watch page's `captionTracks` array. Unknown fields
/// (names, translation flags) are ignored.
#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    /// `"asr"` marks auto-generated captions
    #[serde(default)]
    kind: Option<String>,
}

fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Fetch the transcript for a video, or [`Fetched::Unavailable`] when the
/// video has no usable captions (disabled, unsupported language, region
/// block). The distinction matters upstream: unavailable content is not
/// charged against the user's quota.
pub async fn fetch_transcript(video_id: &str) -> Fetched {
    match try_fetch(video_id).await {
        Ok(text) => Fetched::Text(text),
        Err(err) => {
            log::debug!("transcript fetch failed for {video_id}: {err}");
            Fetched::Unavailable
        }
    }
}

async fn try_fetch(video_id: &str) -> Result<String, TranscriptError> {
    let client = create_client()?;

    let watch_url = format!("{WATCH_URL_PREFIX}{video_id}");
    let page = client
        .get(&watch_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let raw_tracks = caption_tracks_json(&page).ok_or(TranscriptError::NoTracks)?;
    let tracks: Vec<CaptionTrack> = serde_json::from_str(raw_tracks)?;
    if tracks.is_empty() {
        return Err(TranscriptError::NoTracks);
    }
    let track = pick_track(&tracks).ok_or(TranscriptError::NoPreferredLanguage)?;

    let xml = client
        .get(&track.base_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let text = caption_text(&xml);
    if text.is_empty() {
        return Err(TranscriptError::EmptyPayload);
    }
    Ok(text)
}

/// Slice the `captionTracks` JSON array out of a watch page.
///
/// The page is one enormous line of HTML with the player response inlined, so
/// this scans for the key and then walks to the matching closing bracket.
/// Brackets inside JSON strings (track names love them) don't count, and
/// escaped quotes don't end a string.
fn caption_tracks_json(page: &str) -> Option<&str> {
    let marker = "\"captionTracks\":";
    let start = page.find(marker)? + marker.len();
    let rest = &page[start..];
    let open = rest.find('[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in rest.as_bytes().iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pick the best track: walk the language preference list, and within a
/// language take a manual track over an auto-generated one.
fn pick_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    for language in LANGUAGE_PREFERENCE {
        let manual = tracks
            .iter()
            .find(|t| t.language_code == language && t.kind.as_deref() != Some("asr"));
        if let Some(track) = manual {
            return Some(track);
        }
        if let Some(track) = tracks.iter().find(|t| t.language_code == language) {
            return Some(track);
        }
    }
    None
}

/// Flatten timed-text XML (`<transcript><text ...>…</text>…`) into one line
/// of prose. Cue order is preserved; entities are unescaped; whitespace
/// inside a cue is normalized. Malformed trailing XML just truncates the
/// transcript rather than failing it.
fn caption_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut parts: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => in_text = true,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"text" => in_text = false,
            Ok(Event::Text(e)) if in_text => {
                if let Ok(line) = e.unescape() {
                    let cleaned = line.split_whitespace().collect::<Vec<_>>().join(" ");
                    if !cleaned.is_empty() {
                        parts.push(cleaned);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    parts.join(" ")
}
