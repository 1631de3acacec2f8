use std::future::Future;

use crate::cache::balance::FetchedBalance;
use crate::cache::token::AccessToken;
use crate::errors::RefreshError;

pub mod job;
pub mod http;
pub mod demo;
pub mod token_manager;
pub mod upstream_client;

use demo::DemoBankApi;
use http::HttpBankApi;
use job::FetchJob;

/// Token as returned by the credential exchange, before it is anchored in time
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub expires_in_seconds: u64,
}

/// Credential exchange: long-lived key/secret for a short-lived access token.
pub trait TokenExchange: Send + Sync {
    fn exchange(&self) -> impl Future<Output = Result<IssuedToken, RefreshError>> + Send;
}

/// Three-phase balance retrieval: initiate a job, poll it, read its result.
pub trait FetchJobApi: Send + Sync {
    fn initiate(
        &self,
        token: &AccessToken,
    ) -> impl Future<Output = Result<FetchJob, RefreshError>> + Send;

    fn job_status(
        &self,
        token: &AccessToken,
        job_id: &str,
    ) -> impl Future<Output = Result<FetchJob, RefreshError>> + Send;

    fn read_result(
        &self,
        token: &AccessToken,
        job: &FetchJob,
    ) -> impl Future<Output = Result<FetchedBalance, RefreshError>> + Send;
}

#[derive(Debug, Clone)]
pub enum UpstreamKind {
    Http(HttpBankApi),
    Demo(DemoBankApi),
}

impl UpstreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            UpstreamKind::Http(_) => "http",
            UpstreamKind::Demo(_) => "demo",
        }
    }
}

impl TokenExchange for UpstreamKind {
    async fn exchange(&self) -> Result<IssuedToken, RefreshError> {
        match self {
            UpstreamKind::Http(api) => api.exchange().await,
            UpstreamKind::Demo(api) => api.exchange().await,
        }
    }
}

impl FetchJobApi for UpstreamKind {
    async fn initiate(&self, token: &AccessToken) -> Result<FetchJob, RefreshError> {
        match self {
            UpstreamKind::Http(api) => api.initiate(token).await,
            UpstreamKind::Demo(api) => api.initiate(token).await,
        }
    }

    async fn job_status(&self, token: &AccessToken, job_id: &str) -> Result<FetchJob, RefreshError> {
        match self {
            UpstreamKind::Http(api) => api.job_status(token, job_id).await,
            UpstreamKind::Demo(api) => api.job_status(token, job_id).await,
        }
    }

    async fn read_result(&self, token: &AccessToken, job: &FetchJob) -> Result<FetchedBalance, RefreshError> {
        match self {
            UpstreamKind::Http(api) => api.read_result(token, job).await,
            UpstreamKind::Demo(api) => api.read_result(token, job).await,
        }
    }
}
