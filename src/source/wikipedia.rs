//! MediaWiki API source client
//!
//! Fetches page wikitext through the `action=parse` endpoint, following
//! redirects, so the parser downstream sees `[[link]]` markup and can
//! discover the outbound graph. One reqwest client per WikipediaClient;
//! connection pooling is internal to reqwest.

use super::{FetchedPage, SourceClient, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the MediaWiki action API.
pub struct WikipediaClient {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParseBody>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    title: String,
    wikitext: WikitextBody,
}

#[derive(Debug, Deserialize)]
struct WikitextBody {
    #[serde(rename = "*")]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

impl WikipediaClient {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Point at a different MediaWiki installation (or a test server).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!(
                "wikigr/",
                env!("CARGO_PKG_VERSION"),
                " (knowledge-pack builder)"
            ))
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    fn page_url(&self, title: &str) -> String {
        let base = self
            .endpoint
            .trim_end_matches("/w/api.php")
            .trim_end_matches('/');
        format!("{}/wiki/{}", base, title.replace(' ', "_"))
    }
}

#[async_trait]
impl SourceClient for WikipediaClient {
    async fn fetch(&self, title: &str, _url: Option<&str>) -> Result<FetchedPage, SourceError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("action", "parse"),
                ("prop", "wikitext"),
                ("redirects", "1"),
                ("format", "json"),
                ("page", title),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout
                } else {
                    SourceError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited);
        }
        if status.is_server_error() {
            return Err(SourceError::Http(format!("server error: {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Http(format!("unexpected status: {}", status)));
        }

        let body: ParseResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        if let Some(error) = body.error {
            return if error.code == "missingtitle" || error.code == "invalidtitle" {
                Err(SourceError::NotFound(title.to_string()))
            } else {
                Err(SourceError::Http(format!("{}: {}", error.code, error.info)))
            };
        }

        let parse = body
            .parse
            .ok_or_else(|| SourceError::Malformed("response missing parse body".to_string()))?;

        Ok(FetchedPage {
            url: self.page_url(&parse.title),
            title: parse.title,
            raw_text: parse.wikitext.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_derives_from_endpoint() {
        let client = WikipediaClient::new().unwrap();
        assert_eq!(
            client.page_url("Isaac Newton"),
            "https://en.wikipedia.org/wiki/Isaac_Newton"
        );
    }

    #[test]
    fn parse_response_deserializes() {
        let json = r#"{
            "parse": {
                "title": "Gravity",
                "pageid": 38579,
                "wikitext": {"*": "'''Gravity''' is a [[force]]."}
            }
        }"#;
        let body: ParseResponse = serde_json::from_str(json).unwrap();
        let parse = body.parse.unwrap();
        assert_eq!(parse.title, "Gravity");
        assert!(parse.wikitext.content.contains("[[force]]"));
    }

    #[test]
    fn api_error_deserializes() {
        let json = r#"{
            "error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}
        }"#;
        let body: ParseResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.error.unwrap().code, "missingtitle");
    }
}
