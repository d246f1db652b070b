//! YouTube URL normalization and title sanitizing.

use serde::Deserialize;
use url::Url;

use crate::error::{TrimError, TrimResult};

const WATCH_URL: &str = "https://www.youtube.com/watch";

const LONG_FORM_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];

const SHORT_LINK_HOST: &str = "youtu.be";

/// Path prefixes on the long-form host whose next segment is the video id.
const ID_PATH_PREFIXES: &[&str] = &["shorts", "embed", "live"];

#[derive(Deserialize)]
struct WatchQuery {
    v: Option<String>,
}

/// Rewrite any supported YouTube URL shape to the canonical watch URL.
///
/// Only the video id survives; playlist context, timestamps and tracking
/// parameters are dropped.
pub fn normalize_url(raw: &str) -> TrimResult<String> {
    let unrecognized = || TrimError::UnrecognizedUrl(raw.to_string());

    let url = Url::parse(raw.trim()).map_err(|_| unrecognized())?;
    let host = url.host_str().map(str::to_ascii_lowercase).ok_or_else(unrecognized)?;

    let video_id = if LONG_FORM_HOSTS.contains(&host.as_str()) {
        long_form_id(&url)
    } else if host == SHORT_LINK_HOST {
        url.path_segments().and_then(|mut segments| segments.next()).map(str::to_string)
    } else {
        None
    };

    match video_id {
        Some(id) if is_valid_id(&id) => Ok(format!("{WATCH_URL}?v={id}")),
        _ => Err(unrecognized()),
    }
}

fn long_form_id(url: &Url) -> Option<String> {
    if url.path() == "/watch" {
        let query: WatchQuery = serde_urlencoded::from_str(url.query().unwrap_or_default()).ok()?;
        return query.v;
    }

    let mut segments = url.path_segments()?;
    let prefix = segments.next()?;
    if ID_PATH_PREFIXES.contains(&prefix) {
        segments.next().map(str::to_string)
    } else {
        None
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Turn a downloader-reported title into a filesystem-safe file stem.
///
/// The raw title is trimmed before filtering, so a whitespace run left at
/// either edge by a dropped character still becomes `_`.
pub fn sanitize_title(raw: &str) -> String {
    let mut stem = String::with_capacity(raw.len());
    let mut in_space = false;
    for c in raw.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                stem.push('_');
            }
            in_space = true;
        } else if c.is_ascii_alphanumeric() || c == '-' {
            stem.push(c);
            in_space = false;
        }
    }
    stem
}
