//! Draining a paginated backend endpoint.
//!
//! A handful of fields must return an entire collection even though the
//! backend only serves it page by page. The first page is fetched with the
//! total count requested, the remaining pages fan out concurrently, and the
//! results merge back in page order.

use std::future::Future;

use crate::error::FetchError;
use crate::pagination::SliceResult;

/// One page request issued by [`fetch_all_pages`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u64,
    /// Page size, constant across the whole drain.
    pub size: u64,
    /// Whether the backend should report the collection's total count.
    /// Only set on the first page; counting is expensive on some backends.
    pub include_total: bool,
}

/// Fetch every page of a collection and merge the items in page order.
///
/// Page 1 is requested with the total count; its item data is reused, not
/// refetched. If any page request fails the whole operation fails — callers
/// needing partial-success tolerance must wrap this themselves.
pub async fn fetch_all_pages<T, F, Fut>(
    page_size: u64,
    mut fetch_page: F,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<SliceResult<T>, FetchError>>,
{
    if page_size == 0 {
        return Err(FetchError::MalformedRequest {
            reason: "page size must be at least 1".to_string(),
        });
    }

    let first = fetch_page(PageRequest {
        page: 1,
        size: page_size,
        include_total: true,
    })
    .await?;

    let total = first
        .total_count
        .ok_or_else(|| FetchError::MalformedResponse {
            reason: "backend did not report a total count for page 1".to_string(),
        })?;

    let page_count = total.div_ceil(page_size);
    if page_count <= 1 {
        return Ok(first.items);
    }

    let mut remaining = Vec::with_capacity((page_count - 1) as usize);
    for page in 2..=page_count {
        remaining.push(fetch_page(PageRequest {
            page,
            size: page_size,
            include_total: false,
        }));
    }
    let pages = futures::future::try_join_all(remaining).await?;

    let mut items = first.items;
    for page in pages {
        items.extend(page.items);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;

    /// A backend holding `total` numbered items, counting its page requests.
    fn paged_backend(
        total: u64,
        calls: Arc<AtomicUsize>,
    ) -> impl FnMut(PageRequest) -> std::future::Ready<Result<SliceResult<u64>, FetchError>> {
        move |request: PageRequest| {
            calls.fetch_add(1, Ordering::SeqCst);
            let start = (request.page - 1) * request.size;
            let end = (start + request.size).min(total);
            let items: Vec<u64> = (start..end).collect();
            let total_count = request.include_total.then_some(total);
            std::future::ready(Ok(SliceResult { items, total_count }))
        }
    }

    #[tokio::test]
    async fn merges_pages_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items = fetch_all_pages(4, paged_backend(10, calls.clone()))
            .await
            .unwrap();

        assert_eq!(items, (0..10).collect::<Vec<u64>>());
        // Pages 1, 2 and 3.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_single_page_issues_exactly_one_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items = fetch_all_pages(25, paged_backend(10, calls.clone()))
            .await
            .unwrap();

        assert_eq!(items.len(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn an_empty_collection_issues_exactly_one_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items = fetch_all_pages(25, paged_backend(0, calls.clone()))
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_missing_total_count_is_an_error() {
        let result = fetch_all_pages(10, |_request| {
            std::future::ready(Ok(SliceResult::<u64>::new(vec![1, 2, 3], None)))
        })
        .await;

        match result.unwrap_err() {
            FetchError::MalformedResponse { reason } => {
                assert_eq!(reason, "backend did not report a total count for page 1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn any_failing_page_fails_the_whole_drain() {
        let result = fetch_all_pages(2, |request: PageRequest| {
            std::future::ready(if request.page == 3 {
                Err(FetchError::SubrequestHttpError {
                    status_code: Some(500),
                    service: "catalog".to_string(),
                    reason: "HTTP 500".to_string(),
                })
            } else {
                Ok(SliceResult {
                    items: vec![0_u64, 1],
                    total_count: Some(10),
                })
            })
        })
        .await;

        assert_eq!(result.unwrap_err().status_code(), Some(500));
    }

    #[tokio::test]
    async fn a_zero_page_size_is_rejected_before_any_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = fetch_all_pages(0, paged_backend(10, calls.clone())).await;

        assert!(matches!(
            result.unwrap_err(),
            FetchError::MalformedRequest { .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
