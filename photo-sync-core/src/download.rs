//! HTTP client for the source photo-sharing platform (Instagram Graph API).

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::contract::{MediaItem, MediaSource, RefreshedToken};
use crate::error::ApiError;
use crate::normalize::short_code;
use crate::secret::Secret;

pub const DEFAULT_BASE_URL: &str = "https://graph.instagram.com";

const MEDIA_FIELDS: &str = "caption,media_type,media_url,timestamp,permalink";

/// One record of the media listing, as delivered.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaRecord {
    pub id: Option<String>,
    pub caption: Option<String>,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub timestamp: String,
    pub permalink: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<MediaRecord>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    access_token: String,
    expires_in: i64,
}

/// Parse the platform's timestamp: `2017-08-31T22:24:48+0000`, or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, ApiError> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map_err(|e| ApiError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

impl MediaRecord {
    pub fn into_item(self) -> Result<MediaItem, ApiError> {
        // The permalink is written into front matter as a plain scalar.
        if self.permalink.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(ApiError::Decode(format!(
                "permalink {:?} contains whitespace or control characters",
                self.permalink
            )));
        }
        let timestamp = parse_timestamp(&self.timestamp)?;
        let code = short_code(&self.permalink);
        if code.is_empty() {
            return Err(ApiError::Decode(format!(
                "permalink {:?} has no short code",
                self.permalink
            )));
        }
        let media_url = self.media_url.ok_or_else(|| {
            ApiError::Decode(format!("media {code} has no media_url"))
        })?;
        Ok(MediaItem {
            short_code: code,
            caption: self.caption,
            media_url,
            timestamp,
            permalink: self.permalink,
            tags: self.tags,
        })
    }
}

/// Decode a media listing body, mapping an error envelope to [`ApiError::Status`].
pub fn parse_media_page(status: u16, body: &str) -> Result<Vec<MediaItem>, ApiError> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return Err(ApiError::Status {
            status,
            message: envelope.error.message,
        });
    }
    if !(200..300).contains(&status) {
        return Err(ApiError::Status {
            status,
            message: body.to_string(),
        });
    }
    let page: MediaPage =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    page.data.into_iter().map(MediaRecord::into_item).collect()
}

/// Decode a token refresh body.
pub fn parse_refresh(status: u16, body: &str) -> Result<RefreshedToken, ApiError> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return Err(ApiError::Status {
            status,
            message: envelope.error.message,
        });
    }
    if !(200..300).contains(&status) {
        return Err(ApiError::Status {
            status,
            message: body.to_string(),
        });
    }
    let parsed: RefreshBody =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(RefreshedToken {
        access_token: Secret::new(parsed.access_token),
        expires_in: parsed.expires_in,
    })
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Unreachable(e.without_url().to_string())
}

/// Source client. Constructed once per run and passed down explicitly.
pub struct InstagramClient {
    http: Client,
    base_url: String,
    token: Secret,
}

impl InstagramClient {
    pub fn new(token: Secret) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: Secret, base_url: impl Into<String>) -> Self {
        InstagramClient {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<(u16, String), ApiError> {
        let resp = self.http.get(url).query(query).send().await.map_err(transport)?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(transport)?;
        Ok((status, text))
    }
}

#[async_trait]
impl MediaSource for InstagramClient {
    async fn list_media(&self) -> Result<Vec<MediaItem>, ApiError> {
        let url = format!("{}/me/media", self.base_url);
        info!(url = %url, "Fetching media listing");
        let (status, body) = self
            .get_text(
                &url,
                &[("fields", MEDIA_FIELDS), ("access_token", self.token.expose())],
            )
            .await?;
        let items = parse_media_page(status, &body).map_err(|e| {
            error!(status, error = ?e, "Media listing failed");
            e
        })?;
        debug!(count = items.len(), "Media listing decoded");
        Ok(items)
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let resp = self.http.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: format!("media download returned {status}"),
            });
        }
        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    async fn refresh_token(&self, token: &Secret) -> Result<RefreshedToken, ApiError> {
        let url = format!("{}/refresh_access_token", self.base_url);
        info!(url = %url, "Refreshing access token");
        let (status, body) = self
            .get_text(
                &url,
                &[("grant_type", "ig_refresh_token"), ("access_token", token.expose())],
            )
            .await?;
        parse_refresh(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing() {
        let body = r#"{"data":[{"id":"1","caption":"Image text is here #run","media_type":"IMAGE",
            "media_url":"https://scontent.cdninstagram.com/pretend_url.jpg",
            "timestamp":"2017-08-31T22:24:48+0000",
            "permalink":"https://www.instagram.com/p/BYeY7yClLbk/"}],"paging":{}}"#;
        let items = parse_media_page(200, body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].short_code, "BYeY7yClLbk");
        assert_eq!(items[0].caption.as_deref(), Some("Image text is here #run"));
        assert_eq!(items[0].timestamp.timestamp(), 1_504_218_288);
        assert!(items[0].tags.is_empty());
    }

    #[test]
    fn error_envelope_becomes_status() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#;
        assert_eq!(
            parse_media_page(400, body).unwrap_err(),
            ApiError::Status {
                status: 400,
                message: "Invalid OAuth access token.".into()
            }
        );
        assert!(matches!(parse_refresh(400, body), Err(ApiError::Status { .. })));
    }

    #[test]
    fn parses_refresh() {
        let body = r#"{"access_token":"IGQVJnew","token_type":"bearer","expires_in":5183944}"#;
        let token = parse_refresh(200, body).unwrap();
        assert_eq!(token.access_token.expose(), "IGQVJnew");
        assert_eq!(token.expires_in, 5_183_944);
    }

    #[test]
    fn timestamps() {
        assert!(parse_timestamp("2017-08-31T22:24:48+0000").is_ok());
        assert!(parse_timestamp("2017-08-31T22:24:48+00:00").is_ok());
        assert!(matches!(parse_timestamp("yesterday"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn permalink_that_could_inject_front_matter_is_rejected() {
        for permalink in [
            "https://www.instagram.com/p/X/\nlayout: evil",
            "https://www.instagram.com/p/X/ extra: key",
            "https://www.instagram.com/p/X/\t",
        ] {
            let body = serde_json::json!({"data": [{
                "media_url": "https://cdn.example/x.jpg",
                "timestamp": "2017-08-31T22:24:48+0000",
                "permalink": permalink,
            }]})
            .to_string();
            assert!(
                matches!(parse_media_page(200, &body), Err(ApiError::Decode(_))),
                "{permalink:?} accepted"
            );
        }
    }

    #[test]
    fn record_without_media_url_is_rejected() {
        let body = r#"{"data":[{"timestamp":"2017-08-31T22:24:48+0000","permalink":"https://www.instagram.com/p/X/"}]}"#;
        assert!(matches!(parse_media_page(200, body), Err(ApiError::Decode(_))));
    }
}
