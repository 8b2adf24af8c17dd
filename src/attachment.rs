use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;

use crate::domain::Attachment;
use crate::error::{MandrillError, MandrillResult};

pub const UNKNOWN_NAME: &str = "Unknown";
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

static FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).expect("the filename pattern should compile")
});

// RFC 5987 `filename*=charset'language'percent-encoded-name`
static EXTENDED_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*"?([\w-]+)'[\w-]*'([^";]+)"?"#)
        .expect("the extended filename pattern should compile")
});

/// Downloads `url` and packs the body as a base64 attachment.
#[tracing::instrument(name = "Fetch attachment", skip(http_client))]
pub async fn resolve(http_client: &Client, url: &str) -> MandrillResult<Attachment> {
    let fetch_error = |source| MandrillError::AttachmentFetch {
        url: url.to_owned(),
        source,
    };

    let response = http_client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(fetch_error)?;

    let headers = response.headers();
    let name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| UNKNOWN_NAME.to_owned());
    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_owned());

    let body = response.bytes().await.map_err(fetch_error)?;
    tracing::debug!(%name, %mime_type, size = body.len(), "fetched attachment");

    Ok(Attachment {
        content: STANDARD.encode(&body),
        name,
        mime_type,
    })
}

/// Fetches every url concurrently. The output follows the order of `urls`,
/// and the first failure aborts the whole batch.
pub async fn resolve_all(http_client: &Client, urls: &[String]) -> MandrillResult<Vec<Attachment>> {
    try_join_all(urls.iter().map(|url| resolve(http_client, url))).await
}

/// Pulls the file name out of a `Content-Disposition` header value.
///
/// `filename*` wins over `filename` when both are present.
pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    extended_filename(disposition)
        .or_else(|| {
            FILENAME
                .captures(disposition)
                .and_then(|captures| captures.get(1))
                .map(|name| name.as_str().to_owned())
        })
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
}

fn extended_filename(disposition: &str) -> Option<String> {
    let captures = EXTENDED_FILENAME.captures(disposition)?;
    let charset = captures.get(1)?.as_str();
    let encoded = captures.get(2)?.as_str();
    let decoded = percent_decode_str(encoded);

    if charset.eq_ignore_ascii_case("iso-8859-1") {
        // Latin-1 bytes map one to one onto the first 256 code points.
        Some(decoded.map(char::from).collect())
    } else {
        Some(decoded.decode_utf8_lossy().into_owned())
    }
}
