use std::collections::HashMap;
use std::time::Duration;

use http::StatusCode;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::balance::FetchedBalance;
use crate::cache::token::AccessToken;
use crate::config::proc_initiator::UPSTREAM_REQUEST_TIMEOUT_MS_DEFAULT;
use crate::config::upstream::{AccountSelector, UpstreamConfig};
use crate::errors::RefreshError;
use crate::observability::metrics::get_metrics;
use crate::sources::job::{FetchJob, JobState};
use crate::sources::{FetchJobApi, IssuedToken, TokenExchange};

static TOKEN_PHASE: &str = "token";
static INITIATE_PHASE: &str = "initiate";
static POLL_PHASE: &str = "poll";
static RETRIEVE_PHASE: &str = "retrieve";

const DEFAULT_EXPIRES_IN_SECONDS: u64 = 3600;
const RETRIEVE_ACCOUNTS_STEP: &str = "retrieve-accounts";

/// Bank-data API over HTTP: client-credentials token endpoint plus the
/// connection refresh job protocol.
#[derive(Debug, Clone)]
pub struct HttpBankApi {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    user_id: String,
    connection_id: String,
    account: AccountSelector,
    default_currency: String,
    request_timeout: Duration,
}

impl HttpBankApi {
    pub fn new(cfg: &UpstreamConfig, client: Client) -> Self {
        Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            user_id: cfg.user_id.clone(),
            connection_id: cfg.connection_id.clone(),
            account: cfg.account.clone(),
            default_currency: cfg.default_currency.clone(),
            request_timeout: Duration::from_millis(
                cfg.request_timeout_ms.unwrap_or(UPSTREAM_REQUEST_TIMEOUT_MS_DEFAULT),
            ),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorized(&self, request: RequestBuilder, token: &AccessToken) -> RequestBuilder {
        request
            .header(http::header::AUTHORIZATION, token.bearer())
            .header(http::header::ACCEPT, "application/json")
            .timeout(self.request_timeout)
    }

    async fn send(&self, phase: &'static str, request: RequestBuilder) -> Result<Response, RefreshError> {
        let metrics = get_metrics().await;
        metrics.upstream_requests.with_label_values(&[phase]).inc();

        let result = match request.send().await {
            Ok(response) => check_status(phase, response),
            Err(err) => Err(RefreshError::from(err)),
        };
        result.inspect_err(|err| {
            metrics
                .upstream_failures
                .with_label_values(&[phase, err.reason()])
                .inc();
        })
    }
}

/// 401/403 means the token (or credentials) were refused; other 4xx are
/// rejections; 5xx are transient.
fn check_status(phase: &str, response: Response) -> Result<Response, RefreshError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!("{} request failed with {}", phase, status);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RefreshError::Auth(format!(
            "{} request refused: {}",
            phase, status
        ))),
        s if s.is_client_error() => Err(RefreshError::UpstreamRejected(format!(
            "{} request rejected: {}",
            phase, status
        ))),
        _ => Err(RefreshError::Transport(format!("{} request failed: {}", phase, status))),
    }
}

// -------------------------------
// wire formats
// -------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default)]
    steps: Vec<JobStep>,
}

#[derive(Debug, Deserialize)]
struct JobStep {
    title: String,
    status: String,
    result: Option<StepResult>,
}

#[derive(Debug, Deserialize)]
struct StepResult {
    url: Option<String>,
    code: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    data: Vec<AccountRecord>,
}

#[derive(Debug, Deserialize)]
struct AccountRecord {
    id: String,
    institution: Option<InstitutionField>,
    balance: Option<BalanceField>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstitutionField {
    Id(String),
    Object { id: String },
}

impl InstitutionField {
    fn id(&self) -> &str {
        match self {
            InstitutionField::Id(id) => id,
            InstitutionField::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BalanceField {
    Amount(Decimal),
    Object { current: Decimal },
}

impl BalanceField {
    fn amount(&self) -> Decimal {
        match self {
            BalanceField::Amount(amount) => *amount,
            BalanceField::Object { current } => *current,
        }
    }
}

impl JobResponse {
    fn into_job(self) -> FetchJob {
        let state = if self.steps.is_empty() {
            JobState::Submitted
        } else if self.steps.iter().any(|s| s.status == "failed") {
            JobState::Failed
        } else if self.steps.iter().all(|s| s.status == "success") {
            JobState::Succeeded
        } else {
            JobState::Processing
        };

        let failure = self.steps.iter().find(|s| s.status == "failed").map(|s| {
            let detail = s
                .result
                .as_ref()
                .and_then(|r| r.detail.clone().or_else(|| r.code.clone()))
                .unwrap_or_else(|| "no detail".to_owned());
            format!("step '{}' failed: {}", s.title, detail)
        });

        let result_url = |s: &JobStep| {
            s.result
                .as_ref()
                .and_then(|r| r.url.clone())
                .filter(|_| s.status == "success")
        };
        let result_id = self
            .steps
            .iter()
            .find(|s| s.title == RETRIEVE_ACCOUNTS_STEP)
            .and_then(result_url)
            .or_else(|| self.steps.iter().rev().find_map(result_url));

        FetchJob {
            job_id: self.id,
            result_id,
            state,
            failure,
        }
    }
}

impl TokenExchange for HttpBankApi {
    async fn exchange(&self) -> Result<IssuedToken, RefreshError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "client_credentials");
        form.insert("client_id", self.client_id.as_str());
        form.insert("client_secret", self.client_secret.as_str());

        let request = self
            .client
            .post(self.url("/token"))
            .header(http::header::ACCEPT, "application/json")
            .timeout(self.request_timeout)
            .form(&form);

        // a refused credential pair is final, not worth retrying
        let response = self.send(TOKEN_PHASE, request).await.map_err(|err| match err {
            RefreshError::UpstreamRejected(msg) => RefreshError::Auth(msg),
            other => other,
        })?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::Auth(format!("malformed token response: {}", e)))?;

        info!("credential exchange succeeded");
        Ok(IssuedToken {
            value: body.access_token,
            expires_in_seconds: body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS),
        })
    }
}

impl FetchJobApi for HttpBankApi {
    async fn initiate(&self, token: &AccessToken) -> Result<FetchJob, RefreshError> {
        let url = self.url(&format!(
            "/users/{}/connections/{}/refresh",
            self.user_id, self.connection_id
        ));
        let request = self.authorized(self.client.post(url), token);
        let response = self.send(INITIATE_PHASE, request).await?;
        let job: JobResponse = response.json().await?;

        info!("fetch job '{}' submitted", job.id);
        Ok(FetchJob::submitted(job.id))
    }

    async fn job_status(&self, token: &AccessToken, job_id: &str) -> Result<FetchJob, RefreshError> {
        let request = self.authorized(self.client.get(self.url(&format!("/jobs/{}", job_id))), token);
        let response = self.send(POLL_PHASE, request).await?;
        let job: JobResponse = response.json().await?;
        Ok(job.into_job())
    }

    async fn read_result(&self, token: &AccessToken, job: &FetchJob) -> Result<FetchedBalance, RefreshError> {
        let path = job
            .result_id
            .clone()
            .unwrap_or_else(|| format!("/users/{}/accounts", self.user_id));
        let request = self.authorized(self.client.get(self.url(&path)), token);
        let response = self.send(RETRIEVE_PHASE, request).await?;
        let accounts: AccountsResponse = response.json().await?;

        let account = select_account(&self.account, &accounts.data)
            .ok_or_else(|| RefreshError::AccountNotFound(self.account.describe()))?;
        let amount = account
            .balance
            .as_ref()
            .map(BalanceField::amount)
            .ok_or_else(|| {
                warn!("account '{}' carries no balance", account.id);
                RefreshError::UpstreamRejected(format!("account '{}' has no balance", account.id))
            })?;

        Ok(FetchedBalance {
            amount,
            currency: account
                .currency
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| self.default_currency.clone()),
        })
    }
}

fn select_account<'a>(selector: &AccountSelector, accounts: &'a [AccountRecord]) -> Option<&'a AccountRecord> {
    if let Some(account_id) = &selector.account_id {
        return accounts.iter().find(|a| &a.id == account_id);
    }
    let institution_id = selector.institution_id.as_ref()?;
    accounts.iter().find(|a| {
        a.institution
            .as_ref()
            .is_some_and(|i| i.id() == institution_id)
    })
}
