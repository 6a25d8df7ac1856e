use std::path::PathBuf;

use url::Url;

use crate::discover::SiteFormat;
use crate::error::{CoreError, CoreResult};

/// One round of `%XX` decoding. Invalid escapes pass through untouched.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut index = 0usize;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[index + 1]), hex_value(bytes[index + 2]))
            {
                out.push((hi << 4) | lo);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Index pages double- and triple-encode names; decode until stable.
pub fn fully_decode(value: &str) -> String {
    let mut current = percent_decode(value);
    loop {
        let next = percent_decode(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Drops characters no filesystem in the deployment mix accepts.
fn strip_reserved(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*'))
        .collect()
}

/// Directory (relative to the base folder) that a page's files land in,
/// derived from the page URL. The last path segment is dropped so a URL
/// ending in a filename still maps to its directory.
pub fn folder_from_page_url(page_url: &str, format: SiteFormat) -> CoreResult<PathBuf> {
    let parsed = Url::parse(page_url)
        .map_err(|e| CoreError::Config(format!("invalid page url {}: {}", page_url, e)))?;
    let raw_path = parsed.path();

    let relative = match format {
        SiteFormat::SpencerwoooOnedrive => raw_path.strip_prefix('/').unwrap_or(raw_path),
        SiteFormat::AchrouGoindex => match raw_path.find("0:/") {
            Some(pos) => &raw_path[pos + 3..],
            None => {
                return Err(CoreError::Config(format!(
                    "page url {} has no 0:/ marker",
                    page_url
                )))
            }
        },
        SiteFormat::DonwaGoindex | SiteFormat::Maple3142GdIndex => {
            raw_path.strip_prefix('/').unwrap_or(raw_path)
        }
    };

    let cleaned = strip_reserved(&fully_decode(relative));
    let mut segments: Vec<&str> = cleaned.split('/').collect();
    segments.pop();
    Ok(PathBuf::from(segments.join("/")))
}

/// Filename for a download URL: the last slash-separated piece of the raw
/// URL (queries included, matching how index download links embed paths),
/// decoded and cleaned.
pub fn filename_from_url(url: &str) -> String {
    let raw = url.rsplit('/').next().unwrap_or("");
    let cleaned = strip_reserved(&fully_decode(raw));
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "download.bin".to_string()
    } else {
        trimmed.to_string()
    }
}
