use std::time::Duration;

use futures::future::try_join_all;
use playbook_core::config::ApiConfig;
use playbook_core::playbook::PlaybookRecord;
use playbook_core::report::AnalyticsSummary;
use playbook_core::run::RunRecord;
use playbook_core::snapshot::TelemetrySnapshot;
use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("playbook API did not answer within {0} seconds")]
    Timeout(u64),

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// PlaybookApiClient
// ---------------------------------------------------------------------------

/// Read-only client for the playbook run-control API.
#[derive(Debug, Clone)]
pub struct PlaybookApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl PlaybookApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|source| FetchError::Http {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout_secs: config.timeout_seconds,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| self.classify(&url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(|e| self.classify(&url, e))?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout_secs)
        } else {
            FetchError::Http {
                url: url.to_string(),
                source: err,
            }
        }
    }

    /// GET /playbooks
    pub async fn playbooks(&self) -> Result<Vec<PlaybookRecord>, FetchError> {
        self.get_json("/playbooks").await
    }

    /// GET /playbooks/{id}/runs
    pub async fn runs(&self, playbook_id: &str) -> Result<Vec<RunRecord>, FetchError> {
        let mut runs: Vec<RunRecord> = self
            .get_json(&format!("/playbooks/{playbook_id}/runs"))
            .await?;
        for run in &mut runs {
            if run.playbook_id.is_empty() {
                run.playbook_id = playbook_id.to_string();
            }
        }
        Ok(runs)
    }

    /// GET /playbooks/analytics/summary
    pub async fn summary(&self) -> Result<AnalyticsSummary, FetchError> {
        self.get_json("/playbooks/analytics/summary").await
    }

    /// Fetch every playbook and its runs, sanitized into one snapshot.
    ///
    /// The whole fetch is bounded by the configured timeout on top of the
    /// per-request client timeout.
    pub async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, FetchError> {
        let fetch = async {
            let playbooks = self.playbooks().await?;
            let per_playbook =
                try_join_all(playbooks.iter().map(|p| self.runs(&p.id))).await?;
            let runs: Vec<RunRecord> = per_playbook.into_iter().flatten().collect();
            Ok::<_, FetchError>((playbooks, runs))
        };

        let (playbooks, runs) = tokio::time::timeout(self.timeout(), fetch)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout_secs))??;

        tracing::info!(
            playbooks = playbooks.len(),
            runs = runs.len(),
            base_url = %self.base_url,
            "fetched telemetry"
        );
        Ok(TelemetrySnapshot::from_records(playbooks, runs).with_fetched_at(chrono::Utc::now()))
    }
}
