use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cache::balance::FetchedBalance;
use crate::cache::token::AccessToken;
use crate::errors::RefreshError;
use crate::resilience::backoff::PollPolicy;
use crate::sources::job::{FetchJob, JobState};
use crate::sources::FetchJobApi;

/// Runs initiate → poll → retrieve against the upstream. Read-only: it never
/// touches the balance cache.
pub struct UpstreamClient<A> {
    api: Arc<A>,
    poll: PollPolicy,
}

impl<A> UpstreamClient<A>
where
    A: FetchJobApi,
{
    pub fn new(api: Arc<A>, poll: PollPolicy) -> Self {
        Self { api, poll }
    }

    pub async fn fetch_balance(&self, token: &AccessToken) -> Result<FetchedBalance, RefreshError> {
        let job = self.api.initiate(token).await?;
        let job = self.wait_for_job(token, job).await?;
        let balance = self.api.read_result(token, &job).await?;
        info!("job '{}' result read, currency: {}", job.job_id, balance.currency);
        Ok(balance)
    }

    async fn wait_for_job(&self, token: &AccessToken, submitted: FetchJob) -> Result<FetchJob, RefreshError> {
        let job_id = submitted.job_id.clone();
        let mut schedule = self.poll.start();
        let mut job = submitted;

        while !job.state.is_terminal() {
            let Some(delay) = schedule.next_delay() else {
                warn!("job '{}' still {} after {:?}", job_id, job.state.as_str(), self.poll.timeout);
                return Err(RefreshError::UpstreamTimeout {
                    job_id,
                    budget: self.poll.timeout,
                });
            };
            sleep(delay).await;

            match self.api.job_status(token, &job_id).await {
                Ok(status) => {
                    debug!("job '{}' is {}", job_id, status.state.as_str());
                    job = status;
                }
                // refusals will not recover within this cycle
                Err(err @ (RefreshError::Auth(_) | RefreshError::UpstreamRejected(_))) => {
                    return Err(err)
                }
                Err(err) => warn!("job '{}' status check failed, retrying: {}", job_id, err),
            }
        }

        match job.state {
            JobState::Succeeded => Ok(job),
            _ => Err(RefreshError::UpstreamRejected(
                job.failure
                    .unwrap_or_else(|| format!("job '{}' failed", job_id)),
            )),
        }
    }
}
