// src/upstream/acfun.rs — HTTP clients for the AcFun live platform

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{LiveDirectory, LiveEntry, LivePage, Playback, PlaybackResolver, VendorUrl};
use crate::infra::config::UpstreamConfig;
use crate::infra::errors::VaultError;

/// `pcursor` value meaning the listing is complete.
const NO_MORE_CURSOR: &str = "no_more";
const LIST_OK: i64 = 0;
const PLAYBACK_OK: i64 = 1;
const BODY_SNIPPET_LEN: usize = 200;

/// Leading part of a response body for error messages, cut on a char boundary.
fn snippet(body: &str) -> &str {
    if body.len() <= BODY_SNIPPET_LEN {
        return body;
    }
    let mut end = BODY_SNIPPET_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn build_client(config: &UpstreamConfig) -> Result<reqwest::Client, VaultError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(config.user_agent.as_str())
        .gzip(true)
        .build()
        .map_err(|e| VaultError::Config(format!("Cannot build HTTP client: {e}")))
}

async fn post_form(
    client: &reqwest::Client,
    name: &'static str,
    url: &str,
    form: &[(&str, &str)],
) -> Result<String, VaultError> {
    let resp = client
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| VaultError::upstream(name, format!("request failed: {e}")))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| VaultError::upstream(name, format!("cannot read body: {e}")))?;

    if !status.is_success() {
        return Err(VaultError::upstream(
            name,
            format!("HTTP {}: {}", status, snippet(&body)),
        ));
    }
    Ok(body)
}

// ── Live directory ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveListResponse {
    result: Option<i64>,
    #[serde(default)]
    pcursor: String,
    #[serde(default)]
    live_list: Vec<RawLive>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLive {
    live_id: String,
    author_id: i64,
    #[serde(default)]
    user: RawUser,
    #[serde(default)]
    stream_name: String,
    #[serde(default)]
    create_time: i64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawUser {
    #[serde(default)]
    name: String,
}

impl From<RawLive> for LiveEntry {
    fn from(raw: RawLive) -> Self {
        LiveEntry {
            session_id: raw.live_id,
            owner_id: raw.author_id,
            owner_name: raw.user.name,
            stream_name: raw.stream_name,
            start_time_ms: raw.create_time,
            title: raw.title,
        }
    }
}

fn parse_live_list(body: &str) -> Result<LivePage, VaultError> {
    let parsed: LiveListResponse = serde_json::from_str(body).map_err(|e| {
        VaultError::upstream(
            "live-list",
            format!("invalid response ({e}): {}", snippet(body)),
        )
    })?;

    if parsed.result != Some(LIST_OK) {
        return Err(VaultError::upstream(
            "live-list",
            format!("unexpected result: {}", snippet(body)),
        ));
    }

    Ok(LivePage {
        has_more: parsed.pcursor != NO_MORE_CURSOR,
        entries: parsed.live_list.into_iter().map(LiveEntry::from).collect(),
    })
}

/// Channel listing endpoint; one POST returns up to `count` live rooms.
pub struct AcFunDirectory {
    url: String,
    client: reqwest::Client,
}

impl AcFunDirectory {
    pub fn new(config: &UpstreamConfig) -> Result<Self, VaultError> {
        Ok(Self {
            url: config.live_list_url.clone(),
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl LiveDirectory for AcFunDirectory {
    async fn fetch_page(&self, count: u64) -> Result<LivePage, VaultError> {
        let count = count.to_string();
        let body = post_form(
            &self.client,
            "live-list",
            &self.url,
            &[("count", count.as_str()), ("pcursor", "0")],
        )
        .await?;
        parse_live_list(&body)
    }
}

// ── Playback resolver ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PlaybackResponse {
    result: Option<i64>,
    data: Option<PlaybackData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackData {
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    adaptive_manifest: String,
}

fn vendor_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Pull the representation URLs out of the manifest. `adaptationSet` shows up
/// both as a single object and as a list.
fn manifest_urls(manifest: &str) -> Result<(String, Vec<String>), String> {
    if manifest.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let value: serde_json::Value =
        serde_json::from_str(manifest).map_err(|e| format!("invalid manifest: {e}"))?;

    let set = match &value["adaptationSet"] {
        serde_json::Value::Array(sets) => sets.first().cloned().unwrap_or_default(),
        other => other.clone(),
    };
    let Some(representation) = set["representation"].as_array().and_then(|r| r.first()) else {
        return Ok((String::new(), Vec::new()));
    };

    let url = representation["url"].as_str().unwrap_or_default().to_string();
    let backups = representation["backupUrl"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|u| u.as_str())
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok((url, backups))
}

fn parse_playback(session_id: &str, body: &str) -> Result<Playback, VaultError> {
    let parsed: PlaybackResponse = serde_json::from_str(body).map_err(|e| {
        VaultError::upstream(
            "playback",
            format!("invalid response ({e}): {}", snippet(body)),
        )
    })?;

    if parsed.result != Some(PLAYBACK_OK) {
        return Err(VaultError::upstream(
            "playback",
            format!(
                "live '{}' unexpected result: {}",
                session_id,
                snippet(body)
            ),
        ));
    }
    let Some(data) = parsed.data else {
        return Ok(Playback::default());
    };

    let (url, backups) = manifest_urls(&data.adaptive_manifest)
        .map_err(|e| VaultError::upstream("playback", format!("live '{session_id}': {e}")))?;

    let vendor_urls = std::iter::once(url.clone())
        .chain(backups.iter().cloned())
        .filter(|u| !u.is_empty())
        .map(|u| VendorUrl {
            vendor: vendor_of(&u),
            url: u,
        })
        .collect();

    Ok(Playback {
        duration_ms: data.duration,
        url,
        backup_url: backups.into_iter().next().unwrap_or_default(),
        vendor_urls,
    })
}

/// Playback lookup endpoint; POST `liveId`, get the recording manifest.
pub struct AcFunPlayback {
    url: String,
    client: reqwest::Client,
}

impl AcFunPlayback {
    pub fn new(config: &UpstreamConfig) -> Result<Self, VaultError> {
        Ok(Self {
            url: config.playback_url.clone(),
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl PlaybackResolver for AcFunPlayback {
    async fn resolve(&self, session_id: &str) -> Result<Playback, VaultError> {
        let body = post_form(
            &self.client,
            "playback",
            &self.url,
            &[("liveId", session_id)],
        )
        .await?;
        parse_playback(session_id, &body)
    }
}
