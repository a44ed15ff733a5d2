// Paginated retry source: flattens a paged listing capability into a lazy
// sequence of raw entries. The next-page token is saved before a page is
// handed out, so a rate-limit retry resumes at the saved cursor instead of
// restarting the query.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ListError;
use crate::models::{EntryPage, RawEntry};

/// Entry-listing capability implemented by the log store client.
#[async_trait]
pub trait EntryLister: Send + Sync {
    async fn list_entries(
        &self,
        filter: &str,
        page_size: i32,
        project_id: &str,
        page_token: Option<&str>,
    ) -> Result<EntryPage, ListError>;
}

/// Backoff for rate-limited listing calls. `max_attempts = None` retries
/// indefinitely; a cap surfaces `ListError::RateLimited` to the caller
/// once exhausted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub wait: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

/// Lazy sequence of raw entries for one project scope. Consumed once.
pub struct PageStream {
    lister: Arc<dyn EntryLister>,
    filter: String,
    page_size: i32,
    project_id: String,
    retry: RetryPolicy,
    page_token: Option<String>,
    pending: VecDeque<RawEntry>,
    done: bool,
}

impl PageStream {
    pub fn new(
        lister: Arc<dyn EntryLister>,
        filter: impl Into<String>,
        page_size: i32,
        project_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lister,
            filter: filter.into(),
            page_size,
            project_id: project_id.into(),
            retry,
            page_token: None,
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Next raw entry, fetching further pages on demand. After the first
    /// error the stream is exhausted.
    pub async fn next_entry(&mut self) -> Option<Result<RawEntry, ListError>> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page().await {
                self.done = true;
                return Some(Err(e));
            }
        }
    }

    async fn fetch_page(&mut self) -> Result<(), ListError> {
        let mut attempts: u32 = 0;
        loop {
            let result = self
                .lister
                .list_entries(
                    &self.filter,
                    self.page_size,
                    &self.project_id,
                    self.page_token.as_deref(),
                )
                .await;
            match result {
                Ok(page) => {
                    // Save the cursor before handing entries out.
                    self.page_token = page.next_page_token;
                    if self.page_token.is_none() {
                        self.done = true;
                    }
                    self.pending.extend(page.entries);
                    return Ok(());
                }
                Err(ListError::RateLimited) => {
                    attempts += 1;
                    if let Some(max) = self.retry.max_attempts
                        && attempts >= max
                    {
                        return Err(ListError::RateLimited);
                    }
                    tracing::debug!(
                        project_id = %self.project_id,
                        attempts,
                        wait_ms = self.retry.wait.as_millis() as u64,
                        "rate limited; backing off before re-issuing the listing call"
                    );
                    tokio::time::sleep(self.retry.wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
