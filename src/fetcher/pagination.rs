//! Cursor pagination for Graph API collection endpoints
//!
//! Collection responses carry a `paging.next` URL; walking it until absent
//! yields the complete result set. A page ceiling guards against a server
//! bug feeding the same cursor forever.

use crate::fetcher::http::FetchClient;
use crate::fetcher::{FetcherError, FetcherResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Maximum number of pages walked before assuming a cursor loop.
const MAX_PAGES: usize = 10_000;

/// Generic envelope of a paged Graph API response.
#[derive(Debug, Deserialize)]
pub struct PagedResponse<T> {
    /// Records of this page
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Paging block, absent on the last page
    pub paging: Option<Paging>,
}

/// Paging block of a collection response.
#[derive(Debug, Deserialize)]
pub struct Paging {
    /// Fully formed URL of the next page
    pub next: Option<String>,
}

/// Walk pages starting from `url`, invoking `on_page` per page.
///
/// The callback receives the page number (1-based) and the page's records,
/// and returns how many of them it kept, purely for the debug log line.
/// `max_pages` stops the walk early; `None` walks until the cursor runs out.
pub async fn paginate<T, F>(
    client: &FetchClient,
    url: &str,
    params: &[(&str, String)],
    max_pages: Option<usize>,
    mut on_page: F,
) -> FetcherResult<usize>
where
    T: DeserializeOwned,
    F: FnMut(usize, Vec<T>) -> usize,
{
    let page_cap = max_pages.unwrap_or(MAX_PAGES).min(MAX_PAGES);
    let mut page = 1;
    let mut total = 0;

    let mut response: PagedResponse<T> = client.get_json(url, params).await?;

    loop {
        let count = response.data.len();
        let kept = on_page(page, std::mem::take(&mut response.data));
        total += kept;
        debug!(page, records = count, kept, "Processed page");

        if page >= page_cap {
            if max_pages.is_none() {
                // Hitting the built-in ceiling without a requested bound
                // means the cursor is likely looping.
                return Err(FetcherError::InvalidResponse(format!(
                    "pagination exceeded {MAX_PAGES} pages; aborting a likely cursor loop"
                )));
            }
            debug!(pages = page, total, "Reached the requested page limit");
            return Ok(total);
        }

        // Empty page with no cursor means we are done either way.
        let next = response.paging.and_then(|p| p.next);
        match next {
            Some(next_url) => {
                page += 1;
                // Cursor URLs are fully formed, including the original params.
                response = client.get_json(&next_url, &[]).await?;
            }
            None => {
                debug!(pages = page, total, "Reached the last page");
                return Ok(total);
            }
        }
    }
}
