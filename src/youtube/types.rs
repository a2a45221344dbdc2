//! Wire types for the `subscriptions` resource.

use serde::{Deserialize, Serialize};

use crate::state::types::CHANNEL_KIND;
use crate::state::ChannelRef;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionListResponse {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<Subscription>,
}

#[derive(Debug, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub snippet: Option<SubscriptionSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnippet {
    #[serde(default)]
    pub title: String,
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl Subscription {
    /// The subscribed channel, if the item refers to one.
    pub fn into_channel(self) -> Option<ChannelRef> {
        let snippet = self.snippet?;
        let id = snippet.resource_id.channel_id.filter(|id| !id.is_empty())?;
        let kind = match snippet.resource_id.kind {
            k if k.is_empty() => CHANNEL_KIND.to_string(),
            k => k,
        };
        Some(ChannelRef {
            id,
            title: snippet.title,
            kind,
        })
    }
}

/// Request body for `subscriptions.insert`.
#[derive(Debug, Serialize)]
pub struct InsertSubscription {
    pub snippet: InsertSnippet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSnippet {
    pub resource_id: ResourceId,
}

impl InsertSubscription {
    pub fn for_channel(channel: &ChannelRef) -> Self {
        Self {
            snippet: InsertSnippet {
                resource_id: ResourceId {
                    kind: channel.kind.clone(),
                    channel_id: Some(channel.id.clone()),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_page() {
        let json = r#"{
            "nextPageToken": "CDIQAA",
            "items": [
                {"snippet": {"title": "Alpha", "resourceId": {"kind": "youtube#channel", "channelId": "UC1"}}},
                {"snippet": {"title": "Broken", "resourceId": {"kind": "youtube#channel"}}},
                {"snippet": {"title": "Bare", "resourceId": {"channelId": "UC2"}}},
                {}
            ]
        }"#;
        let page: SubscriptionListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("CDIQAA"));
        let channels: Vec<ChannelRef> = page
            .items
            .into_iter()
            .filter_map(Subscription::into_channel)
            .collect();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id, "UC1");
        assert_eq!(channels[0].title, "Alpha");
        assert_eq!(channels[0].kind, CHANNEL_KIND);
        assert_eq!(channels[1].id, "UC2");
        assert_eq!(channels[1].kind, CHANNEL_KIND);
    }

    #[test]
    fn test_last_page_has_no_token() {
        let page: SubscriptionListResponse = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(page.next_page_token.is_none());
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_insert_body_shape() {
        let body = InsertSubscription::for_channel(&ChannelRef::new("UCxyz", "Title"));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "snippet": {"resourceId": {"kind": "youtube#channel", "channelId": "UCxyz"}}
            })
        );
    }
}
