// REST clients for Cloud Logging (entries:list) and Resource Manager
// (projects). Credential acquisition stays outside the reader: a bearer
// access token comes from the environment, e.g. from
// `gcloud auth print-access-token`.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::errors::ListError;
use crate::models::{EntryPage, RawEntry};
use crate::reader::ProjectLister;
use crate::source::EntryLister;

const LOGGING_URL: &str = "https://logging.googleapis.com/v2/entries:list";
const RESOURCE_MANAGER_URL: &str = "https://cloudresourcemanager.googleapis.com/v1/projects";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GcpClient {
    http: reqwest::Client,
    access_token: String,
    project_id: String,
    logging_url: String,
    resource_manager_url: String,
}

impl GcpClient {
    pub fn new(
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            access_token: access_token.into(),
            project_id: project_id.into(),
            logging_url: LOGGING_URL.to_string(),
            resource_manager_url: RESOURCE_MANAGER_URL.to_string(),
        })
    }

    /// Project from GOOGLE_CLOUD_PROJECT, token from GOOGLE_ACCESS_TOKEN.
    pub fn from_env() -> anyhow::Result<Self> {
        let project_id =
            std::env::var("GOOGLE_CLOUD_PROJECT").context("GOOGLE_CLOUD_PROJECT is not set")?;
        let access_token = std::env::var("GOOGLE_ACCESS_TOKEN").context(
            "GOOGLE_ACCESS_TOKEN is not set (try `gcloud auth print-access-token`)",
        )?;
        Self::new(project_id, access_token)
    }

    /// Points both clients at alternate endpoints, e.g. a local fake
    /// server in tests.
    pub fn with_base_urls(
        mut self,
        logging_url: impl Into<String>,
        resource_manager_url: impl Into<String>,
    ) -> Self {
        self.logging_url = logging_url.into();
        self.resource_manager_url = resource_manager_url.into();
        self
    }

    /// The authenticated client's own project; the planner's fallback.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn classify(status: StatusCode, body: String) -> ListError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => ListError::RateLimited,
            StatusCode::FORBIDDEN => ListError::PermissionDenied(body),
            StatusCode::NOT_FOUND => ListError::NotFound(body),
            _ => ListError::Other(anyhow!("HTTP {status}: {body}")),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesRequest<'a> {
    resource_names: Vec<String>,
    filter: &'a str,
    page_size: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListEntriesResponse {
    entries: Vec<RawEntry>,
    next_page_token: Option<String>,
}

#[async_trait]
impl EntryLister for GcpClient {
    async fn list_entries(
        &self,
        filter: &str,
        page_size: i32,
        project_id: &str,
        page_token: Option<&str>,
    ) -> Result<EntryPage, ListError> {
        let request = ListEntriesRequest {
            resource_names: vec![format!("projects/{project_id}")],
            filter,
            page_size,
            page_token,
        };
        let response = self
            .http
            .post(&self.logging_url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ListError::Other(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(status, body));
        }
        let body: ListEntriesResponse = response
            .json()
            .await
            .map_err(|e| ListError::Other(e.into()))?;
        Ok(EntryPage {
            entries: body.entries,
            next_page_token: body.next_page_token,
        })
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListProjectsResponse {
    projects: Vec<ProjectEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectEntry {
    project_id: String,
}

#[async_trait]
impl ProjectLister for GcpClient {
    async fn list_projects(&self) -> Result<Vec<String>, ListError> {
        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&self.resource_manager_url)
                .bearer_auth(&self.access_token);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request
                .send()
                .await
                .map_err(|e| ListError::Other(e.into()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Self::classify(status, body));
            }
            let body: ListProjectsResponse = response
                .json()
                .await
                .map_err(|e| ListError::Other(e.into()))?;
            projects.extend(body.projects.into_iter().map(|p| p.project_id));

            page_token = body.next_page_token;
            if page_token.is_none() {
                return Ok(projects);
            }
        }
    }
}
