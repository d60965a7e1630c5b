//! BigQuery REST client
//!
//! Covers the handful of calls replication needs: dataset and table
//! management, NDJSON load jobs through the multipart upload endpoint and
//! standard-SQL query jobs. Jobs are inserted with a client-chosen id and
//! polled until they report `DONE`.

use crate::adapters::bigquery::auth::TokenSource;
use crate::config::TargetConfig;
use crate::domain::errors::BigQueryError;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

type BqResult<T> = std::result::Result<T, BigQueryError>;

const BOUNDARY: &str = "tidewater_load_boundary";

/// Columns shared by the main and staging tables
fn row_schema() -> Value {
    json!({
        "fields": [
            { "name": "id", "type": "STRING", "mode": "REQUIRED" },
            { "name": "insertedAt", "type": "TIMESTAMP", "mode": "REQUIRED" },
            { "name": "data", "type": "STRING", "mode": "REQUIRED" },
            { "name": "hash", "type": "STRING", "mode": "REQUIRED" },
        ]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource<'a> {
    dataset_reference: DatasetReference<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
}

/// Client bound to one project and one credential
pub struct BigQueryClient {
    http: Client,
    tokens: Arc<dyn TokenSource>,
    project: String,
    api_base_url: String,
    upload_base_url: String,
    location: Option<String>,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl BigQueryClient {
    /// # Errors
    ///
    /// Returns `BigQueryError::Transport` if the HTTP client cannot be built
    pub fn new(
        config: &TargetConfig,
        project: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> BqResult<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BigQueryError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            tokens,
            project: project.into(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            upload_base_url: config.upload_base_url.trim_end_matches('/').to_string(),
            location: config.location.clone(),
            poll_interval: Duration::from_millis(config.job_poll_interval_ms),
            job_timeout: Duration::from_secs(config.job_timeout_seconds),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.api_base_url, self.project)
    }

    fn table_url(&self, dataset: &str, table: &str) -> String {
        format!("{}/datasets/{dataset}/tables/{table}", self.project_url())
    }

    async fn send(&self, request: RequestBuilder) -> BqResult<Response> {
        let token = self.tokens.token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BigQueryError::Transport(e.to_string()))
    }

    /// Lists at most one dataset, proving the token and project are usable
    pub async fn ping(&self) -> BqResult<()> {
        let url = format!("{}/datasets?maxResults=1", self.project_url());
        let resp = self.send(self.http.get(&url)).await?;
        expect_success(resp).await?;
        Ok(())
    }

    /// Creates `dataset`; an existing dataset is fine
    pub async fn ensure_dataset(&self, dataset: &str) -> BqResult<()> {
        let url = format!("{}/datasets", self.project_url());
        let body = DatasetResource {
            dataset_reference: DatasetReference {
                project_id: &self.project,
                dataset_id: dataset,
            },
            location: self.location.as_deref(),
        };
        let resp = self.send(self.http.post(&url).json(&body)).await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        expect_success(resp).await?;
        tracing::info!(project = %self.project, dataset, "Created dataset");
        Ok(())
    }

    /// Creates `table` with the row schema; an existing table is fine
    pub async fn ensure_table(&self, dataset: &str, table: &str) -> BqResult<()> {
        let url = format!("{}/datasets/{dataset}/tables", self.project_url());
        let body = json!({
            "tableReference": {
                "projectId": self.project,
                "datasetId": dataset,
                "tableId": table,
            },
            "schema": row_schema(),
        });
        let resp = self.send(self.http.post(&url).json(&body)).await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        expect_success(resp).await?;
        tracing::debug!(dataset, table, "Created table");
        Ok(())
    }

    pub async fn table_exists(&self, dataset: &str, table: &str) -> BqResult<bool> {
        let resp = self
            .send(self.http.get(self.table_url(dataset, table)))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        expect_success(resp).await?;
        Ok(true)
    }

    /// Deletes `table`; a missing table is fine
    pub async fn delete_table(&self, dataset: &str, table: &str) -> BqResult<()> {
        let resp = self
            .send(self.http.delete(self.table_url(dataset, table)))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        expect_success(resp).await?;
        Ok(())
    }

    /// Appends newline-delimited JSON rows to `table` and waits for the job
    pub async fn load_ndjson(&self, dataset: &str, table: &str, rows: Vec<u8>) -> BqResult<()> {
        let job_id = new_job_id("load");
        let metadata = json!({
            "jobReference": {
                "projectId": self.project,
                "jobId": job_id,
                "location": self.location,
            },
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": self.project,
                        "datasetId": dataset,
                        "tableId": table,
                    },
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": "WRITE_APPEND",
                    "schema": row_schema(),
                }
            }
        });

        let url = format!(
            "{}/projects/{}/jobs?uploadType=multipart",
            self.upload_base_url, self.project
        );
        let request = self
            .http
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(multipart_body(&metadata, &rows));
        let resp = self.send(request).await?;
        let job: JobResponse = read_json(expect_success(resp).await?).await?;
        self.wait(job).await
    }

    /// Runs a standard-SQL statement and waits for it to finish
    pub async fn query(&self, sql: &str) -> BqResult<()> {
        let body = json!({
            "jobReference": {
                "projectId": self.project,
                "jobId": new_job_id("query"),
                "location": self.location,
            },
            "configuration": {
                "query": {
                    "query": sql,
                    "useLegacySql": false,
                }
            }
        });
        let url = format!("{}/jobs", self.project_url());
        let resp = self.send(self.http.post(&url).json(&body)).await?;
        let job: JobResponse = read_json(expect_success(resp).await?).await?;
        self.wait(job).await
    }

    async fn wait(&self, mut job: JobResponse) -> BqResult<()> {
        let deadline = Instant::now() + self.job_timeout;
        loop {
            if let Some(status) = &job.status {
                if status.state == "DONE" {
                    return match &status.error_result {
                        Some(error) => Err(BigQueryError::JobFailed {
                            job_id: job.job_reference.job_id.clone(),
                            message: error.message.clone(),
                        }),
                        None => Ok(()),
                    };
                }
            }
            if Instant::now() >= deadline {
                return Err(BigQueryError::Timeout(job.job_reference.job_id));
            }
            tokio::time::sleep(self.poll_interval).await;

            let mut url = format!("{}/jobs/{}", self.project_url(), job.job_reference.job_id);
            if let Some(location) = &job.job_reference.location {
                url.push_str(&format!("?location={location}"));
            }
            let resp = self.send(self.http.get(&url)).await?;
            job = read_json(expect_success(resp).await?).await?;
        }
    }
}

fn new_job_id(kind: &str) -> String {
    format!("tidewater_{kind}_{}", uuid::Uuid::new_v4().simple())
}

fn multipart_body(metadata: &Value, rows: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(rows.len() + 1024);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(rows);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn expect_success(resp: Response) -> BqResult<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(BigQueryError::RequestFailed {
        status,
        message: error_message(&body),
    })
}

/// `error.message` of a Google API error body, or the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: Response) -> BqResult<T> {
    resp.json::<T>()
        .await
        .map_err(|e| BigQueryError::InvalidResponse(e.to_string()))
}
