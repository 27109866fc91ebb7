//! Draining cursor-paginated registry listings

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{FutureExt as _, TryStreamExt as _};
use registry_driver::{Driver, DriverError, ImageDetail, Page};

/// Future for a single page of a listing.
pub type PageFuture<'a, T> = BoxFuture<'a, Result<Page<T>, DriverError>>;

type FetchPage<'a, T> = Box<dyn FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a>;

enum PaginatedState<'a, T> {
    Query(Option<String>),
    Requesting(PageFuture<'a, T>),
    Buffered {
        items: VecDeque<T>,
        next: Option<String>,
    },
    Done,
}

/// A stream of items drawn from a cursor-paginated listing.
///
/// Pages are requested lazily, one at a time, starting with no cursor and
/// following each page's `next` cursor until a page arrives without one.
/// The first failing page ends the stream after yielding its error.
#[pin_project::pin_project]
pub struct Paginated<'a, T> {
    fetch: FetchPage<'a, T>,
    state: PaginatedState<'a, T>,
    pages: usize,
}

impl<T> fmt::Debug for Paginated<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginated")
            .field("pages", &self.pages)
            .finish()
    }
}

impl<'a, T> Paginated<'a, T> {
    /// Create a paginated stream from a function which fetches the page at a cursor.
    pub fn new<F>(fetch: F) -> Self
    where
        F: FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            state: PaginatedState::Query(None),
            pages: 0,
        }
    }
}

impl<T> futures::Stream for Paginated<'_, T> {
    type Item = Result<T, DriverError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        loop {
            match this.state {
                PaginatedState::Query(cursor) => {
                    let cursor = cursor.take();
                    tracing::trace!(page = *this.pages + 1, ?cursor, "Requesting page");
                    *this.state = PaginatedState::Requesting((*this.fetch)(cursor));
                }
                PaginatedState::Requesting(future) => match future.poll_unpin(cx) {
                    Poll::Ready(Ok(page)) => {
                        *this.pages += 1;
                        tracing::trace!(
                            page = *this.pages,
                            items = page.items.len(),
                            more = page.next.is_some(),
                            "Received page"
                        );
                        *this.state = PaginatedState::Buffered {
                            items: VecDeque::from(page.items),
                            next: page.next,
                        };
                    }
                    Poll::Ready(Err(error)) => {
                        *this.state = PaginatedState::Done;
                        return Poll::Ready(Some(Err(error)));
                    }
                    Poll::Pending => return Poll::Pending,
                },
                PaginatedState::Buffered { items, next } => {
                    if let Some(item) = items.pop_front() {
                        return Poll::Ready(Some(Ok(item)));
                    }

                    match next.take() {
                        Some(cursor) => *this.state = PaginatedState::Query(Some(cursor)),
                        None => {
                            tracing::trace!(pages = *this.pages, "Listing exhausted");
                            *this.state = PaginatedState::Done;
                        }
                    }
                }
                PaginatedState::Done => return Poll::Ready(None),
            }
        }
    }
}

/// Every repository name in the registry, page by page.
pub fn repositories<D>(driver: &D) -> Paginated<'_, String>
where
    D: Driver + Send + Sync + ?Sized,
{
    Paginated::new(move |cursor: Option<String>| {
        async move { driver.list_repositories(cursor.as_deref()).await }.boxed()
    })
}

/// Every image in a repository, page by page.
pub fn images<'a, D>(driver: &'a D, repository: &'a str) -> Paginated<'a, ImageDetail>
where
    D: Driver + Send + Sync + ?Sized,
{
    Paginated::new(move |cursor: Option<String>| {
        async move { driver.list_images(repository, cursor.as_deref()).await }.boxed()
    })
}

/// Drain a listing into memory.
///
/// Either every item of every page is returned, in page order, or the first
/// page error is. Nothing is retried.
pub async fn collect_all<T>(listing: Paginated<'_, T>) -> Result<Vec<T>, DriverError> {
    listing.try_collect().await
}
