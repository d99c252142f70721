use crate::app::ports::{FetchError, VideoMetadataPort};
use crate::common::config::AppConfig;
use crate::common::constants::UNKNOWN_LANGUAGE;
use crate::common::error::Result;
use crate::common::types::{ChartEntry, VideoMetadata};
use crate::pipeline::processing::duration::parse_duration_seconds;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Error reasons the Data API uses when the daily quota is spent
const QUOTA_REASONS: &[&str] = &["quotaExceeded", "dailyLimitExceeded"];

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    content_details: ContentDetails,
    #[serde(default)]
    statistics: Statistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    default_audio_language: Option<String>,
    default_language: Option<String>,
    title: Option<String>,
    channel_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

/// Counts arrive as decimal strings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    reason: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl VideoItem {
    fn language(&self) -> String {
        non_empty(self.snippet.default_audio_language.clone())
            .or_else(|| non_empty(self.snippet.default_language.clone()))
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
    }

    fn duration_raw(&self) -> String {
        self.content_details
            .duration
            .clone()
            .unwrap_or_else(|| "PT0S".to_string())
    }
}

fn count(value: &Option<String>) -> u64 {
    value
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

pub(crate) fn parse_video_list(body: &str) -> std::result::Result<Vec<VideoMetadata>, FetchError> {
    let response: VideoListResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Transient(format!("malformed videos response: {}", e)))?;
    Ok(response
        .items
        .into_iter()
        .map(|item| VideoMetadata {
            language: item.language(),
            duration_seconds: parse_duration_seconds(&item.duration_raw()),
            id: item.id,
        })
        .collect())
}

pub(crate) fn parse_chart(body: &str) -> std::result::Result<Vec<ChartEntry>, FetchError> {
    let response: VideoListResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Transient(format!("malformed chart response: {}", e)))?;
    Ok(response
        .items
        .into_iter()
        .map(|item| {
            let duration_raw = item.duration_raw();
            ChartEntry {
                duration_seconds: parse_duration_seconds(&duration_raw),
                duration_raw,
                title: item.snippet.title.clone().unwrap_or_default(),
                channel: item.snippet.channel_title.clone().unwrap_or_default(),
                views: count(&item.statistics.view_count),
                likes: count(&item.statistics.like_count),
                comments: count(&item.statistics.comment_count),
                id: item.id,
            }
        })
        .collect())
}

pub(crate) fn parse_search(body: &str) -> std::result::Result<Option<String>, FetchError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Transient(format!("malformed search response: {}", e)))?;
    Ok(response
        .items
        .into_iter()
        .find_map(|item| non_empty(item.id.video_id)))
}

/// Decide whether an error response means the quota is spent
pub(crate) fn classify_error(status: u16, body: &str) -> FetchError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .unwrap_or_else(|| body.chars().take(200).collect());

    let quota_reason = envelope
        .as_ref()
        .map(|e| {
            e.error.errors.iter().any(|d| {
                d.reason
                    .as_deref()
                    .map(|r| QUOTA_REASONS.contains(&r))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);

    if quota_reason || body.contains("quotaExceeded") {
        FetchError::QuotaExceeded(message)
    } else {
        FetchError::Transient(format!("HTTP {}: {}", status, message))
    }
}

/// YouTube Data API v3 client
pub struct YoutubeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl YoutubeClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(
            api_key,
            &config.youtube.base_url,
            config.youtube.timeout_seconds.map(Duration::from_secs),
        )
    }

    async fn get(&self, resource: &str, query: &[(&str, &str)]) -> std::result::Result<String, FetchError> {
        let url = format!("{}/{}", self.base_url, resource);
        debug!("HTTP GET request to: {} {:?}", url, query);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.without_url().to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transient(e.without_url().to_string()))?;
        debug!("HTTP response: status={}, size={} bytes", status.as_u16(), body.len());
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl VideoMetadataPort for YoutubeClient {
    async fn videos_by_id(&self, ids: &[String]) -> std::result::Result<Vec<VideoMetadata>, FetchError> {
        let joined = ids.join(",");
        let body = self
            .get("videos", &[("part", "snippet,contentDetails"), ("id", joined.as_str())])
            .await?;
        parse_video_list(&body)
    }

    async fn search_video_id(&self, name: &str) -> std::result::Result<Option<String>, FetchError> {
        let body = self
            .get(
                "search",
                &[("part", "id"), ("type", "video"), ("maxResults", "1"), ("q", name)],
            )
            .await?;
        parse_search(&body)
    }

    async fn most_popular(
        &self,
        region_code: &str,
        max_results: u32,
    ) -> std::result::Result<Vec<ChartEntry>, FetchError> {
        let max = max_results.to_string();
        let body = self
            .get(
                "videos",
                &[
                    ("part", "snippet,contentDetails,statistics"),
                    ("chart", "mostPopular"),
                    ("regionCode", region_code),
                    ("maxResults", max.as_str()),
                ],
            )
            .await?;
        parse_chart(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_list_with_language_fallbacks() {
        let body = r#"{
            "items": [
                {"id": "a", "snippet": {"defaultAudioLanguage": "en-US", "defaultLanguage": "en"},
                 "contentDetails": {"duration": "PT1H2M3S"}},
                {"id": "b", "snippet": {"defaultLanguage": "ko"},
                 "contentDetails": {"duration": "PT45S"}},
                {"id": "c", "snippet": {}, "contentDetails": {}},
                {"id": "d", "snippet": {"defaultAudioLanguage": ""}, "contentDetails": {"duration": "bogus"}}
            ]
        }"#;
        let items = parse_video_list(body).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].language, "en-US");
        assert_eq!(items[0].duration_seconds, 3723);
        assert_eq!(items[1].language, "ko");
        assert_eq!(items[1].duration_seconds, 45);
        assert_eq!(items[2].language, "unknown");
        assert_eq!(items[2].duration_seconds, 0);
        assert_eq!(items[3].language, "unknown");
        assert_eq!(items[3].duration_seconds, 0);
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(parse_video_list(r#"{"kind": "youtube#videoListResponse"}"#)
            .unwrap()
            .is_empty());
        assert!(parse_video_list("not json").is_err());
    }

    #[test]
    fn test_classify_quota_error() {
        let body = r#"{"error": {"code": 403, "message": "The request cannot be completed because you have exceeded your quota.",
            "errors": [{"message": "...", "domain": "youtube.quota", "reason": "quotaExceeded"}]}}"#;
        let err = classify_error(403, body);
        assert!(err.is_quota());
    }

    #[test]
    fn test_classify_other_errors_as_transient() {
        let body = r#"{"error": {"code": 500, "message": "Backend Error", "errors": [{"reason": "backendError"}]}}"#;
        match classify_error(500, body) {
            FetchError::Transient(msg) => assert!(msg.contains("Backend Error")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!classify_error(502, "<html>Bad Gateway</html>").is_quota());
    }

    #[test]
    fn test_classify_unstructured_quota_body() {
        assert!(classify_error(403, "quotaExceeded").is_quota());
    }

    #[test]
    fn test_parse_chart_entries() {
        let body = r#"{"items": [{"id": "z", "snippet": {"title": "T", "channelTitle": "C"},
            "contentDetails": {"duration": "PT4M"}, "statistics": {"viewCount": "12", "likeCount": "3"}}]}"#;
        let entries = parse_chart(body).unwrap();
        assert_eq!(entries[0].title, "T");
        assert_eq!(entries[0].channel, "C");
        assert_eq!(entries[0].duration_seconds, 240);
        assert_eq!(entries[0].views, 12);
        assert_eq!(entries[0].likes, 3);
        assert_eq!(entries[0].comments, 0);
    }

    #[test]
    fn test_parse_search_takes_first_video() {
        let body = r#"{"items": [{"id": {"kind": "youtube#channel"}}, {"id": {"videoId": "vid9"}}]}"#;
        assert_eq!(parse_search(body).unwrap(), Some("vid9".to_string()));
        assert_eq!(parse_search(r#"{"items": []}"#).unwrap(), None);
    }
}
