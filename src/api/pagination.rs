//! Page-walking helper for paginated collections.

use std::future::Future;

use tracing::trace;

/// Fetch pages 1, 2, 3, ... until the first empty page, concatenating the
/// results in order.
///
/// There is no upper bound: a server that never returns an empty page keeps
/// this looping. Used for both Lighthouse and GitLab collections.
pub async fn collect_pages<T, E, F, Fut>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let mut all = Vec::new();
    let mut page = 1;

    loop {
        let items = fetch(page).await?;
        trace!(page, count = items.len(), "Fetched page");
        if items.is_empty() {
            break;
        }
        all.extend(items);
        page += 1;
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::{ApiError, Result};

    #[tokio::test]
    async fn test_concatenates_until_empty_page() {
        let sizes = [100usize, 100, 37, 0];
        let mut requested = Vec::new();

        let items = collect_pages(|page| {
            requested.push(page);
            let size = sizes[(page - 1) as usize];
            async move { Ok::<_, ApiError>((0..size).map(|i| (page, i)).collect::<Vec<_>>()) }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 237);
        assert_eq!(requested, vec![1, 2, 3, 4]);
        assert_eq!(items[0], (1, 0));
        assert_eq!(items[236], (3, 36));
    }

    #[tokio::test]
    async fn test_first_page_empty() {
        let items: Vec<u32> = collect_pages(|_| async { Ok::<_, ApiError>(Vec::new()) })
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_error_aborts() {
        let result: Result<Vec<u32>> = collect_pages(|page| async move {
            if page == 2 {
                Err(ApiError::Decode("boom".to_string()))
            } else {
                Ok(vec![page])
            }
        })
        .await;
        assert!(result.is_err());
    }
}
