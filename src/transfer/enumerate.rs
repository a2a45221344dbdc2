use std::collections::HashSet;

use crate::state::ChannelRef;
use crate::youtube::{ApiError, SubscriptionSource};

/// Read every subscription of the source account, pages concatenated in
/// server order.
///
/// Not retried: a failure here aborts the run before anything is written to
/// the destination.
pub async fn fetch_all(source: &dyn SubscriptionSource) -> Result<Vec<ChannelRef>, ApiError> {
    let mut channels = Vec::new();
    let mut seen_tokens: HashSet<String> = HashSet::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = source.list_page(page_token.as_deref()).await?;
        pages += 1;
        tracing::debug!(
            page = pages,
            count = page.channels.len(),
            "Fetched subscription page"
        );
        channels.extend(page.channels);

        match page.next_page_token {
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(ApiError::Pagination(format!(
                        "page token {next:?} returned twice after {pages} pages"
                    )));
                }
                page_token = Some(next);
            }
            None => break,
        }
    }

    tracing::info!(
        "Found {} subscriptions on the source account ({} pages)",
        channels.len(),
        pages
    );
    Ok(channels)
}
