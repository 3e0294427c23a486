pub mod gmail;
pub mod google;
pub mod notion;
pub mod youtube;

use std::future::Future;

use tracing::debug;

use crate::error::SyncError;

/// One page of results and the token for the next one, if any.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// Repeat `fetch` with the continuation token until none is returned.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, SyncError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, SyncError>>,
{
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch(cursor.take()).await?;
        all.extend(page.items);
        debug!("Fetched page (total {})", all.len());
        match page.next {
            Some(token) if !token.is_empty() => cursor = Some(token),
            _ => break,
        }
    }
    Ok(all)
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("link_sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn follows_tokens_until_absent() {
        let mut seen = Vec::new();
        let all = collect_pages(|cursor| {
            seen.push(cursor.clone());
            async move {
                let (items, next) = match cursor.as_deref() {
                    None => (vec![1, 2], Some("p2".to_string())),
                    Some("p2") => (vec![3], Some(String::new())),
                    _ => (vec![99], None),
                };
                Ok(Page { items, next })
            }
        })
        .await
        .unwrap();
        assert_eq!(all, vec![1, 2, 3]);
        assert_eq!(seen, vec![None, Some("p2".to_string())]);
    }

    #[tokio::test]
    async fn error_stops_paging() {
        let result: Result<Vec<u8>, _> = collect_pages(|_| async {
            Err(SyncError::Http {
                status: 502,
                body: String::new(),
            })
        })
        .await;
        assert!(result.is_err());
    }
}
