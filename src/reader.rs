// Multi-project query planner: builds the server-side filter expression,
// resolves the project and log lists, and exposes the combined record
// stream with per-project failure isolation.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};

use crate::errors::ReadError;
use crate::models::{FlowRecord, base_log_name};
use crate::normalize::normalize;
use crate::source::{EntryLister, PageStream, RetryPolicy};

/// Project discovery capability (resource-directory service).
#[async_trait]
pub trait ProjectLister: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<String>, crate::errors::ListError>;
}

/// Query options. Unset times default to the last hour.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Window start; defaults to one hour before the end.
    pub start_time: Option<NaiveDateTime>,
    /// Window end; defaults to now (UTC).
    pub end_time: Option<NaiveDateTime>,
    /// Extra server-side predicates, ANDed after the generated ones.
    pub filters: Vec<String>,
    /// Explicit log name; overrides the per-project defaults.
    pub log_name: Option<String>,
    pub collect_multiple_projects: bool,
    pub page_size: i32,
    pub retry: RetryPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            filters: Vec::new(),
            log_name: None,
            collect_multiple_projects: false,
            page_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Reader {
    lister: Arc<dyn EntryLister>,
    project_list: Vec<String>,
    log_list: Vec<String>,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    filters: Vec<String>,
    page_size: i32,
    retry: RetryPolicy,
}

impl Reader {
    /// Resolves the project and log lists up front. Project discovery is
    /// best-effort: any failure falls back to the default project rather
    /// than failing the query.
    pub async fn new(
        lister: Arc<dyn EntryLister>,
        default_project: &str,
        project_lister: Option<&dyn ProjectLister>,
        config: ReaderConfig,
    ) -> Self {
        let project_list = if config.collect_multiple_projects {
            resolve_projects(project_lister, default_project).await
        } else {
            vec![default_project.to_string()]
        };

        let log_list = match &config.log_name {
            Some(name) => vec![name.clone()],
            None => project_list.iter().map(|p| base_log_name(p)).collect(),
        };

        let end_time = config.end_time.unwrap_or_else(|| Utc::now().naive_utc());
        let start_time = config
            .start_time
            .unwrap_or_else(|| end_time - Duration::hours(1));

        Self {
            lister,
            project_list,
            log_list,
            start_time,
            end_time,
            filters: config.filters,
            page_size: config.page_size,
            retry: config.retry,
        }
    }

    pub fn project_list(&self) -> &[String] {
        &self.project_list
    }

    pub fn log_list(&self) -> &[String] {
        &self.log_list
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.end_time
    }

    /// The deterministic filter expression sent to the log store: fixed
    /// resource type, log-name disjunction, padded indexed-timestamp
    /// bounds, exact payload bounds, then any user filters, ANDed in that
    /// order. The indexed Timestamp field is padded by one minute on each
    /// side to tolerate ingestion lag at the store's coarse index while the
    /// payload bounds keep the result set exact.
    pub fn filter_expression(&self) -> String {
        let padding = Duration::minutes(1);
        let timestamp_start = format_dt(self.start_time - padding);
        let timestamp_end = format_dt(self.end_time + padding);
        let payload_start = format_dt(self.start_time);
        let payload_end = format_dt(self.end_time);

        let log_filter = self
            .log_list
            .iter()
            .map(|log| format!("logName=\"{log}\""))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut parts = vec![
            "resource.type=\"gce_subnetwork\"".to_string(),
            format!("({log_filter})"),
            format!("Timestamp >= \"{timestamp_start}\""),
            format!("Timestamp < \"{timestamp_end}\""),
            format!("jsonPayload.start_time >= \"{payload_start}\""),
            format!("jsonPayload.start_time < \"{payload_end}\""),
        ];
        parts.extend(self.filters.iter().cloned());
        parts.join(" AND ")
    }

    /// Single-pass stream of flow records, project-major.
    pub fn records(&self) -> RecordStream {
        RecordStream {
            lister: Arc::clone(&self.lister),
            expression: self.filter_expression(),
            page_size: self.page_size,
            retry: self.retry.clone(),
            remaining: self.project_list.iter().cloned().collect(),
            current: None,
            bytes_processed: 0,
        }
    }
}

async fn resolve_projects(
    project_lister: Option<&dyn ProjectLister>,
    default_project: &str,
) -> Vec<String> {
    let Some(project_lister) = project_lister else {
        return vec![default_project.to_string()];
    };
    match project_lister.list_projects().await {
        Ok(projects) if !projects.is_empty() => projects,
        Ok(_) => vec![default_project.to_string()],
        Err(e) => {
            tracing::warn!(
                error = %e,
                default_project,
                "project discovery failed; falling back to the default project"
            );
            vec![default_project.to_string()]
        }
    }
}

fn format_dt(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Combined record stream: all records for the first project, then the
/// next. Per-project ordering follows the store's page order; there is no
/// global ordering guarantee. Inaccessible projects are skipped with a
/// warning. Consumed once, not restartable.
pub struct RecordStream {
    lister: Arc<dyn EntryLister>,
    expression: String,
    page_size: i32,
    retry: RetryPolicy,
    remaining: VecDeque<String>,
    current: Option<PageStream>,
    bytes_processed: u64,
}

impl RecordStream {
    pub async fn next_record(&mut self) -> Option<Result<FlowRecord, ReadError>> {
        loop {
            let Some(stream) = self.current.as_mut() else {
                let project_id = self.remaining.pop_front()?;
                self.current = Some(PageStream::new(
                    Arc::clone(&self.lister),
                    self.expression.clone(),
                    self.page_size,
                    project_id,
                    self.retry.clone(),
                ));
                continue;
            };
            match stream.next_entry().await {
                Some(Ok(entry)) => {
                    self.bytes_processed += entry.size_estimate();
                    return Some(normalize(&entry).map_err(ReadError::from));
                }
                Some(Err(e)) if e.is_skippable() => {
                    tracing::warn!(
                        project_id = stream.project_id(),
                        error = %e,
                        "skipping inaccessible project"
                    );
                    self.current = None;
                }
                Some(Err(e)) => {
                    self.remaining.clear();
                    self.current = None;
                    return Some(Err(e.into()));
                }
                None => self.current = None,
            }
        }
    }

    /// Bytes consumed so far, from per-entry size estimates.
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// Drains the stream into memory; mainly for tests and small queries.
    pub async fn collect_records(&mut self) -> Result<Vec<FlowRecord>, ReadError> {
        let mut out = Vec::new();
        while let Some(result) = self.next_record().await {
            out.push(result?);
        }
        Ok(out)
    }
}
