//! Content-derived identifiers for trend items.
//!
//! Two fingerprints are kept per item. The identity fingerprint is stable
//! across re-fetches and becomes the item `id`. The content fingerprint
//! changes whenever the upstream text or link is edited, which is how a
//! re-fetch is classified as an update rather than a no-op.

use sha2::{Digest, Sha256};

use crate::items::{RawItem, Source};

/// Field separator that cannot appear in normalised text.
const SEP: u8 = 0x1f;

/// Stable identity fingerprint for `raw` observed from `source`.
///
/// Keyed on the upstream id when the adapter supplies one, else the URL,
/// else the whitespace-normalised lowercase text.
#[must_use]
pub fn item_fingerprint(source: Source, raw: &RawItem) -> String {
    let key = match raw.external_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => format!("id:{id}"),
        _ if !raw.url.trim().is_empty() => format!("url:{}", raw.url.trim()),
        _ => format!("text:{}", normalise_text(&raw.text)),
    };

    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update([SEP]);
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the editable content of an item.
#[must_use]
pub fn content_fingerprint(text: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalise_text(text).as_bytes());
    hasher.update([SEP]);
    hasher.update(url.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalise_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
