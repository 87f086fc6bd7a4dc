use crate::util::{sanitize_metadata, validate_list_url};
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Header metadata and rule count of a filter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterListInfo {
    /// `! Title:` value, `None` when the list has no title line
    pub title: Option<String>,
    pub description: String,
    pub homepage: String,
    pub version: String,
    pub rules_count: u64,
}

/// Errors that can occur while probing a filter list.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The URL failed validation (bad scheme, localhost, private address)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("response too large")]
    TooLarge,
    #[error("server answered HTTP {0}")]
    Status(u16),
    /// Body has neither a title nor any rule line
    #[error("not a filter list")]
    NotAFilterList,
}

/// Where filter lists are read from.
pub trait FilterListSource: Send + Sync {
    fn fetch_info(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<FilterListInfo, SourceError>> + Send;
}

// ============================================================================
// HTTP Source
// ============================================================================

/// Reads filter lists over HTTP(S), refusing local and private hosts.
#[derive(Debug, Clone)]
pub struct HttpFilterListSource {
    client: reqwest::Client,
    timeout: Duration,
    max_size: usize,
}

impl HttpFilterListSource {
    pub fn new(timeout: Duration, max_size: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(redirect_policy())
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, timeout, max_size))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration, max_size: usize) -> Self {
        Self {
            client,
            timeout,
            max_size,
        }
    }
}

impl FilterListSource for HttpFilterListSource {
    async fn fetch_info(&self, url: &str) -> Result<FilterListInfo, SourceError> {
        let validated =
            validate_list_url(url).map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        fetch_list(&self.client, validated.as_str(), self.timeout, self.max_size).await
    }
}

// ============================================================================
// Static Source
// ============================================================================

/// Serves list bodies from memory, keyed by URL. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct StaticListSource {
    bodies: HashMap<String, String>,
}

impl StaticListSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<String>) -> &mut Self {
        self.bodies.insert(url.into(), body.into());
        self
    }
}

impl FilterListSource for StaticListSource {
    async fn fetch_info(&self, url: &str) -> Result<FilterListInfo, SourceError> {
        match self.bodies.get(url) {
            Some(body) => parse_list(body),
            None => Err(SourceError::Status(404)),
        }
    }
}

/// Up to 3 hops, no loops. Every hop must pass the same URL checks as the
/// initial request.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }
        if let Err(e) = validate_list_url(url.as_str()) {
            return attempt.error(e);
        }

        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}

/// Fetch a pre-validated URL and probe its header.
async fn fetch_list(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_size: usize,
) -> Result<FilterListInfo, SourceError> {
    let response = tokio::time::timeout(timeout, client.get(url).send())
        .await
        .map_err(|_| SourceError::Timeout)??;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }

    let bytes = tokio::time::timeout(timeout, read_limited(response, max_size))
        .await
        .map_err(|_| SourceError::Timeout)??;

    let info = parse_list(&String::from_utf8_lossy(&bytes))?;
    tracing::debug!(
        url = %url,
        rules = info.rules_count,
        has_title = info.title.is_some(),
        "Probed filter list"
    );
    Ok(info)
}

/// Read the body, failing as soon as it exceeds `max_size`.
async fn read_limited(
    response: reqwest::Response,
    max_size: usize,
) -> Result<Vec<u8>, SourceError> {
    if response
        .content_length()
        .is_some_and(|len| len > max_size as u64)
    {
        return Err(SourceError::TooLarge);
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > max_size {
            return Err(SourceError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

// ============================================================================
// Header Parsing
// ============================================================================

/// Extract `! Key: value` header fields and count rule lines.
///
/// Only the first occurrence of each field counts. Rule lines are the
/// non-empty lines not starting with `!` (comment) or `[` (format marker).
/// Markup bodies are refused outright.
pub fn parse_list(body: &str) -> Result<FilterListInfo, SourceError> {
    let body = body.trim_start_matches('\u{feff}');
    if body.trim_start().starts_with('<') {
        return Err(SourceError::NotAFilterList);
    }

    let mut info = FilterListInfo::default();
    let mut description = None;
    let mut homepage = None;
    let mut version = None;

    for line in body.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('[') {
            continue;
        }
        let Some(comment) = line.strip_prefix('!') else {
            info.rules_count += 1;
            continue;
        };

        let Some((key, value)) = comment.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "Title" => &mut info.title,
            "Description" => &mut description,
            "Homepage" => &mut homepage,
            "Version" => &mut version,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(sanitize_metadata(value));
        }
    }

    info.title = info.title.filter(|t| !t.is_empty());
    if info.title.is_none() && info.rules_count == 0 {
        return Err(SourceError::NotAFilterList);
    }

    info.description = description.unwrap_or_default();
    info.homepage = homepage.unwrap_or_default();
    info.version = version.unwrap_or_default();
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIST: &str = "[Adblock Plus 2.0]
! Title: Example List
! Description: Blocks example ads
! Version: 2.1.7
! Homepage: https://example.com/list
! Expires: 4 days
!
||ads.example.com^
##.banner

@@||example.com/allowed.js
";

    #[test]
    fn test_parse_header_and_rules() {
        let info = parse_list(LIST).unwrap();
        assert_eq!(
            info,
            FilterListInfo {
                title: Some("Example List".into()),
                description: "Blocks example ads".into(),
                homepage: "https://example.com/list".into(),
                version: "2.1.7".into(),
                rules_count: 3,
            }
        );
    }

    #[test]
    fn test_first_header_occurrence_wins() {
        let info = parse_list("! Title: First\n! Title: Second\n||a^\n").unwrap();
        assert_eq!(info.title.as_deref(), Some("First"));
    }

    #[test]
    fn test_title_with_colon_kept_whole() {
        let info = parse_list("! Title: Lists: the sequel\n").unwrap();
        assert_eq!(info.title.as_deref(), Some("Lists: the sequel"));
    }

    #[test]
    fn test_rules_without_title_accepted() {
        let info = parse_list("||tracker.example^\n||ads.example^\r\n").unwrap();
        assert!(info.title.is_none());
        assert_eq!(info.rules_count, 2);
    }

    #[test]
    fn test_empty_or_comment_only_is_not_a_list() {
        assert!(matches!(parse_list(""), Err(SourceError::NotAFilterList)));
        assert!(matches!(
            parse_list("! just a comment\n\n"),
            Err(SourceError::NotAFilterList)
        ));
        assert!(matches!(
            parse_list("! Title:   \n"),
            Err(SourceError::NotAFilterList)
        ));
    }

    #[test]
    fn test_markup_is_not_a_list() {
        assert!(matches!(
            parse_list("\u{feff}<!DOCTYPE html>\n<html><body>hi</body></html>"),
            Err(SourceError::NotAFilterList)
        ));
    }

    #[test]
    fn test_header_control_chars_stripped() {
        let info = parse_list("! Title: Evil\x1b[31m List\x07\n||a^\n").unwrap();
        assert_eq!(info.title.as_deref(), Some("Evil List"));
    }

    #[tokio::test]
    async fn test_static_source() {
        let mut source = StaticListSource::new();
        source.insert("https://lists.example/a.txt", LIST);

        let info = source.fetch_info("https://lists.example/a.txt").await.unwrap();
        assert_eq!(info.version, "2.1.7");
        assert!(matches!(
            source.fetch_info("https://lists.example/b.txt").await,
            Err(SourceError::Status(404))
        ));
    }

    #[tokio::test]
    async fn test_source_rejects_private_urls() {
        let source = HttpFilterListSource::with_client(
            reqwest::Client::new(),
            Duration::from_secs(1),
            1024,
        );
        for url in ["not a url", "http://localhost/list.txt", "http://192.168.1.1/list.txt"] {
            assert!(matches!(
                source.fetch_info(url).await,
                Err(SourceError::InvalidUrl(_))
            ));
        }
    }

    // These use fetch_list (internal) to bypass URL validation on the
    // localhost mock server.

    #[tokio::test]
    async fn test_fetch_list_from_server() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/filters/2.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LIST))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/filters/2.txt", mock_server.uri());
        let info = fetch_list(&client, &url, Duration::from_secs(5), 1024 * 1024)
            .await
            .unwrap();

        assert_eq!(info.title.as_deref(), Some("Example List"));
        assert_eq!(info.rules_count, 3);
    }

    #[tokio::test]
    async fn test_fetch_list_http_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_list(
            &client,
            &format!("{}/missing.txt", mock_server.uri()),
            Duration::from_secs(5),
            1024,
        )
        .await;

        assert!(matches!(result, Err(SourceError::Status(404))));
    }

    #[tokio::test]
    async fn test_fetch_list_too_large() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("||a^\n".repeat(100)))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_list(
            &client,
            &format!("{}/big.txt", mock_server.uri()),
            Duration::from_secs(5),
            64,
        )
        .await;

        assert!(matches!(result, Err(SourceError::TooLarge)));
    }

    #[tokio::test]
    async fn test_fetch_list_timeout() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(LIST)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_list(
            &client,
            &format!("{}/slow.txt", mock_server.uri()),
            Duration::from_millis(50),
            1024 * 1024,
        )
        .await;

        assert!(matches!(result, Err(SourceError::Timeout)));
    }
}
