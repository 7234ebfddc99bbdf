//! Cancellation and cursor paging shared by both collectors.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use insight_core::catalog::{ListOptions, ListPage};
use insight_core::{Error, Result};

/// Races `fut` against `cancel`, yielding `Error::Cancelled` if the token fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Follows the listing cursor from `options` until the catalogue returns an
/// empty continuation token, collecting every item.
pub(crate) async fn drain_pages<T, F, Fut>(
    mut options: ListOptions,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<Vec<T>>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<ListPage<T>>>,
{
    let mut items = Vec::new();
    loop {
        let page = cancellable(cancel, fetch(options.clone())).await?;
        items.extend(page.items);
        if page.cursor.is_empty() {
            return Ok(items);
        }
        if page.cursor == options.cursor {
            return Err(Error::catalog(format!(
                "catalogue returned the same cursor twice: {}",
                page.cursor
            )));
        }
        options.cursor = page.cursor;
    }
}
