//! Resource metadata discovery.
//!
//! A single range-capable `GET` is sent before any segment is planned. Only the
//! status line and headers are consulted; the body is dropped unread. The
//! resulting [`ResourceDescriptor`] is immutable for the lifetime of a
//! [`Download`](crate::Download).
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use reqwest::header::{
    CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, HeaderMap, LAST_MODIFIED,
    RANGE,
};
use sanitize_filename::sanitize;
use tracing::{debug, warn};
use url::Url;

/// Name used when neither the server nor the URL offer a usable file name.
pub const FALLBACK_FILE_NAME: &str = "output.bin";

/// Snapshot of what the server told us about a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Location segment requests go to (the probe's post-redirect URL).
    pub url: Url,
    pub suggested_name: String,
    /// Total size in bytes, `None` when the server did not say.
    pub content_length: Option<u64>,
    /// Whether the probe came back as `206 Partial Content`.
    pub supports_ranges: bool,
    pub user_agent: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
}

impl ResourceDescriptor {
    /// Descriptor for a resource we know nothing about. Planning against it
    /// always yields a single, non-resumable segment.
    pub fn degraded(url: Url, user_agent: impl Into<String>) -> Self {
        let suggested_name = get_filename_from_url(&url);
        Self {
            url,
            suggested_name,
            content_length: None,
            supports_ranges: false,
            user_agent: user_agent.into(),
            etag: None,
            last_modified: None,
            content_type: None,
        }
    }

    /// Sends the probe request and builds a descriptor from the response.
    ///
    /// Never fails: any transport error leaves the descriptor degraded.
    pub async fn probe(client: &reqwest::Client, url: Url, user_agent: &str) -> Self {
        let response = match client
            .get(url.clone())
            .header(RANGE, "bytes=0-")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "probe failed, falling back to a single stream");
                return Self::degraded(url, user_agent);
            }
        };

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers();

        let suggested_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(name_from_content_disposition)
            .unwrap_or_else(|| get_filename_from_url(&final_url));

        let descriptor = Self {
            suggested_name,
            content_length: content_length(headers),
            supports_ranges: status == StatusCode::PARTIAL_CONTENT,
            user_agent: user_agent.to_string(),
            etag: header_string(headers, ETAG),
            last_modified: header_string(headers, LAST_MODIFIED),
            content_type: header_string(headers, CONTENT_TYPE),
            url: final_url,
        };

        debug!(
            url = %descriptor.url,
            status = status.as_u16(),
            length = ?descriptor.content_length,
            ranges = descriptor.supports_ranges,
            name = %descriptor.suggested_name,
            "probed resource"
        );
        descriptor
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Total length from `Content-Length`, or from the `/total` part of
/// `Content-Range` when the length header is missing.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .or_else(|| {
            headers
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.rsplit_once('/'))
                .and_then(|(_, total)| total.trim().parse::<u64>().ok())
        })
}

/// Takes the value after the first `=` of a `Content-Disposition` header,
/// with quotes removed. Returns `None` when there is no usable value.
pub fn name_from_content_disposition(value: &str) -> Option<String> {
    let raw = value.split('=').nth(1)?;
    let raw = raw.split(';').next().unwrap_or(raw).replace('"', "");
    let name = sanitize(raw.trim());
    (!name.is_empty()).then_some(name)
}

/// Name suggested by the URL's last path segment, percent-decoded and
/// sanitized. Used when the server sends no `Content-Disposition`.
pub fn get_filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut s| s.next_back().map(str::to_string))
        .map(|s| percent_decode_str(&s).decode_utf8_lossy().to_string())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
