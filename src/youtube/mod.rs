//! YouTube Data API v3 `subscriptions` client.
//!
//! [`SubscriptionSource`] and [`SubscriptionSink`] are the seams the transfer
//! engine talks to; [`YouTubeClient`] implements both over HTTP.

pub mod error;
pub mod types;

use std::sync::Arc;

use url::Url;

pub use self::error::{ApiError, ApiErrorKind};
use self::types::{InsertSubscription, Subscription, SubscriptionListResponse};
use crate::auth::AuthorizedClient;
use crate::state::ChannelRef;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";

/// Server-side maximum for `subscriptions.list`.
const PAGE_SIZE: u32 = 50;
const LIST_FIELDS: &str = "nextPageToken,items/snippet(title,resourceId(kind,channelId))";

/// One page of the source account's subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionPage {
    pub channels: Vec<ChannelRef>,
    pub next_page_token: Option<String>,
}

#[async_trait::async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Fetch the page at `page_token`, or the first page for `None`.
    async fn list_page(&self, page_token: Option<&str>) -> Result<SubscriptionPage, ApiError>;
}

#[async_trait::async_trait]
pub trait SubscriptionSink: Send + Sync {
    /// Subscribe the destination account to `channel`.
    async fn insert(&self, channel: &ChannelRef) -> Result<(), ApiError>;
}

pub struct YouTubeClient {
    auth: Arc<AuthorizedClient>,
    base_url: Url,
}

impl YouTubeClient {
    pub fn new(auth: Arc<AuthorizedClient>, base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            auth,
            base_url: normalize_base(base_url)?,
        })
    }

    fn list_url(&self, page_token: Option<&str>) -> Result<Url, url::ParseError> {
        list_url(&self.base_url, page_token)
    }

    fn insert_url(&self) -> Result<Url, url::ParseError> {
        insert_url(&self.base_url)
    }
}

/// Ensure a trailing slash so `join` appends instead of replacing the last segment.
fn normalize_base(base_url: &str) -> Result<Url, url::ParseError> {
    if base_url.ends_with('/') {
        Url::parse(base_url)
    } else {
        Url::parse(&format!("{base_url}/"))
    }
}

fn list_url(base: &Url, page_token: Option<&str>) -> Result<Url, url::ParseError> {
    let mut url = base.join("subscriptions")?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("part", "snippet")
            .append_pair("mine", "true")
            .append_pair("maxResults", &PAGE_SIZE.to_string())
            .append_pair("fields", LIST_FIELDS);
        if let Some(token) = page_token {
            query.append_pair("pageToken", token);
        }
    }
    Ok(url)
}

fn insert_url(base: &Url) -> Result<Url, url::ParseError> {
    let mut url = base.join("subscriptions")?;
    url.query_pairs_mut().append_pair("part", "snippet");
    Ok(url)
}

/// Turn a non-success response into a classified error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_response(status.as_u16(), &body))
}

#[async_trait::async_trait]
impl SubscriptionSource for YouTubeClient {
    async fn list_page(&self, page_token: Option<&str>) -> Result<SubscriptionPage, ApiError> {
        let url = self.list_url(page_token)?;
        tracing::debug!(role = %self.auth.role(), "GET {}", url);
        let bearer = self.auth.bearer().await?;
        let response = self.auth.http().get(url).bearer_auth(bearer).send().await?;
        let body = check_status(response).await?.text().await?;
        let page: SubscriptionListResponse = serde_json::from_str(&body)?;
        Ok(SubscriptionPage {
            channels: page
                .items
                .into_iter()
                .filter_map(Subscription::into_channel)
                .collect(),
            next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait::async_trait]
impl SubscriptionSink for YouTubeClient {
    async fn insert(&self, channel: &ChannelRef) -> Result<(), ApiError> {
        let url = self.insert_url()?;
        let bearer = self.auth.bearer().await?;
        let response = self
            .auth
            .http()
            .post(url)
            .bearer_auth(bearer)
            .json(&InsertSubscription::for_channel(channel))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
