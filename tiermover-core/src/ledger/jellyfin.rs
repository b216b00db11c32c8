use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::{LedgerError, PlaybackLedger};
use crate::error::{EvictionError, Result};
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{MediaItem, MediaKind};

/// Header carrying the Jellyfin API key.
pub const TOKEN_HEADER: &str = "X-MediaBrowser-Token";

const ITEMS_PATH: &str = "Items";
const SYSTEM_INFO_PATH: &str = "System/Info";
const CONSUMED_QUERY: [(&str, &str); 3] = [
    ("IsPlayed", "true"),
    ("Recursive", "true"),
    ("IncludeItemTypes", "Movie,Episode"),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsPage {
    /// Required: a body without it is a decode failure, not an empty
    /// library.
    items: Vec<ItemDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemDto {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "Type", default)]
    kind: Option<String>,
    #[serde(default)]
    user_data: Option<UserDataDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserDataDto {
    #[serde(default)]
    played: Option<bool>,
}

impl ItemDto {
    fn into_media_item(self) -> Option<MediaItem> {
        let name = self.name?;
        // The query already filters on IsPlayed; only an explicit `false`
        // overrides it.
        let consumed = self
            .user_data
            .and_then(|data| data.played)
            .unwrap_or(true);
        Some(MediaItem {
            id: self.id,
            name,
            kind: self
                .kind
                .as_deref()
                .map(MediaKind::from_jellyfin)
                .unwrap_or(MediaKind::Other),
            consumed,
        })
    }
}

/// Jellyfin-backed [`PlaybackLedger`].
#[derive(Debug, Clone)]
pub struct JellyfinClient {
    base_url: Url,
    api_key: String,
    client: Client,
    retry: RetryPolicy,
}

impl JellyfinClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> std::result::Result<Self, LedgerError> {
        let mut base_url = Url::parse(base_url)?;
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            client,
            retry,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Confirms the server accepts the configured token.
    ///
    /// A 401/403 comes back as [`LedgerError::Unauthorized`], which the
    /// daemon treats as fatal at startup.
    pub async fn verify_credentials(
        &self,
    ) -> std::result::Result<(), LedgerError> {
        self.retry
            .run("jellyfin.system_info", LedgerError::is_transient, || {
                self.fetch_system_info()
            })
            .await
            .map_err(RetryError::into_inner)?;
        info!(server = %self.base_url, "jellyfin credentials accepted");
        Ok(())
    }

    async fn fetch_system_info(&self) -> std::result::Result<(), LedgerError> {
        let url = self.base_url.join(SYSTEM_INFO_PATH)?;
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.api_key)
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    async fn request_consumed(
        &self,
    ) -> std::result::Result<Vec<MediaItem>, LedgerError> {
        let url = self.base_url.join(ITEMS_PATH)?;
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.api_key)
            .query(&CONSUMED_QUERY)
            .send()
            .await?;

        let bytes = check_status(response)?.bytes().await?;
        let page: ItemsPage = serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        let total = page.items.len();
        let items: Vec<MediaItem> = page
            .items
            .into_iter()
            .filter_map(ItemDto::into_media_item)
            .filter(|item| item.consumed)
            .collect();

        debug!(
            returned = total,
            consumed = items.len(),
            "jellyfin played items fetched"
        );
        Ok(items)
    }
}

fn check_status(
    response: Response,
) -> std::result::Result<Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LedgerError::Unauthorized { status }
        }
        StatusCode::TOO_MANY_REQUESTS => LedgerError::HttpStatus { status, url },
        s if s.is_client_error() => LedgerError::Rejected { status, url },
        _ => LedgerError::HttpStatus { status, url },
    })
}

#[async_trait]
impl PlaybackLedger for JellyfinClient {
    async fn fetch_consumed_items(&self) -> Result<Vec<MediaItem>> {
        self.retry
            .run("jellyfin.items", LedgerError::is_transient, || {
                self.request_consumed()
            })
            .await
            .map_err(|err| match err {
                RetryError::Exhausted { attempts, last } => {
                    EvictionError::LedgerUnreachable {
                        attempts,
                        source: last,
                    }
                }
                RetryError::Permanent { error, .. } => {
                    EvictionError::Ledger(error)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let client = JellyfinClient::new(
            "http://jellyfin.local:8096/jf",
            "key",
            Duration::from_secs(5),
            RetryPolicy::immediate(1),
        )
        .expect("valid url");

        assert_eq!(
            client.base_url().join(ITEMS_PATH).unwrap().as_str(),
            "http://jellyfin.local:8096/jf/Items"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = JellyfinClient::new(
            "not a url",
            "key",
            Duration::from_secs(5),
            RetryPolicy::immediate(1),
        )
        .expect_err("must fail");
        assert!(matches!(err, LedgerError::InvalidUrl(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn items_without_a_name_are_dropped() {
        let page: ItemsPage = serde_json::from_str(
            r#"{"Items":[
                {"Name":"Heat","Type":"Movie","Id":"a1"},
                {"Type":"Episode"},
                {"Name":"Pilot","Type":"Episode","UserData":{"Played":false}}
            ]}"#,
        )
        .unwrap();

        let items: Vec<_> = page
            .items
            .into_iter()
            .filter_map(ItemDto::into_media_item)
            .collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Heat");
        assert_eq!(items[0].kind, MediaKind::Movie);
        assert!(items[0].consumed);
        assert!(!items[1].consumed);
    }

    #[test]
    fn body_without_items_array_does_not_decode() {
        assert!(serde_json::from_str::<ItemsPage>("{}").is_err());
        assert!(
            serde_json::from_str::<ItemsPage>(r#"{"items":[{"Name":"Heat"}]}"#)
                .is_err()
        );
        let empty: ItemsPage = serde_json::from_str(r#"{"Items":[]}"#).unwrap();
        assert!(empty.items.is_empty());
    }
}
