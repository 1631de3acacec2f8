use rand::Rng;
use rust_decimal::Decimal;
use tracing::info;

use crate::cache::balance::FetchedBalance;
use crate::cache::token::AccessToken;
use crate::errors::RefreshError;
use crate::sources::job::{FetchJob, JobState};
use crate::sources::{FetchJobApi, IssuedToken, TokenExchange};

const DEMO_TOKEN_TTL_SECONDS: u64 = 3600;
const DEMO_JOB_ID: &str = "demo-job";

/// Synthetic upstream: a random balance between 1200.00 and 5000.00.
#[derive(Debug, Clone)]
pub struct DemoBankApi {
    pub currency: String,
}

impl DemoBankApi {
    pub fn new(currency: String) -> Self {
        Self { currency }
    }
}

fn random_amount() -> Decimal {
    let cents: i64 = rand::thread_rng().gen_range(120_000..500_000);
    Decimal::new(cents, 2)
}

impl TokenExchange for DemoBankApi {
    async fn exchange(&self) -> Result<IssuedToken, RefreshError> {
        info!("demo upstream: issuing synthetic token");
        Ok(IssuedToken {
            value: "demo-token".to_owned(),
            expires_in_seconds: DEMO_TOKEN_TTL_SECONDS,
        })
    }
}

impl FetchJobApi for DemoBankApi {
    async fn initiate(&self, _token: &AccessToken) -> Result<FetchJob, RefreshError> {
        Ok(FetchJob::submitted(DEMO_JOB_ID))
    }

    async fn job_status(&self, _token: &AccessToken, job_id: &str) -> Result<FetchJob, RefreshError> {
        Ok(FetchJob {
            job_id: job_id.to_owned(),
            result_id: Some("demo-result".to_owned()),
            state: JobState::Succeeded,
            failure: None,
        })
    }

    async fn read_result(&self, _token: &AccessToken, _job: &FetchJob) -> Result<FetchedBalance, RefreshError> {
        Ok(FetchedBalance {
            amount: random_amount(),
            currency: self.currency.clone(),
        })
    }
}
