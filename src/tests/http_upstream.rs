#[cfg(test)]
mod test {

    use std::time::Duration;

    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    use crate::cache::token::AccessToken;
    use crate::config::upstream::UpstreamConfig;
    use crate::errors::RefreshError;
    use crate::resilience::backoff::PollPolicy;
    use crate::sources::http::HttpBankApi;
    use crate::sources::job::{FetchJob, JobState};
    use crate::sources::upstream_client::UpstreamClient;
    use crate::sources::{FetchJobApi, TokenExchange};
    use crate::tests::common::{build_reqwest_client, decimal, t0};

    fn upstream_config(base_url: &str, account: &str) -> UpstreamConfig {
        let yaml = format!(
            r#"
base_url: "{base_url}/"
client_id: "client-1"
client_secret: "secret-1"
user_id: "user-1"
connection_id: "conn-1"
account:
  {account}
request_timeout_ms: 2000
"#
        );
        serde_yaml::from_str(&yaml).expect("upstream config")
    }

    fn api(server: &MockServer, account: &str) -> HttpBankApi {
        HttpBankApi::new(&upstream_config(&server.base_url(), account), build_reqwest_client())
    }

    fn token() -> AccessToken {
        AccessToken::new("abc-123".to_owned(), t0() + chrono::Duration::hours(1))
    }

    fn accounts_body() -> serde_json::Value {
        json!({
            "type": "list",
            "data": [
                {
                    "id": "acc-savings",
                    "institution": "AU00000",
                    "balance": "250.10",
                    "currency": "AUD"
                },
                {
                    "id": "acc-main",
                    "institution": { "id": "AU00001" },
                    "balance": { "current": "1542.55" },
                    "currency": "AUD"
                }
            ]
        })
    }

    #[tokio::test]
    async fn credential_exchange_posts_client_credentials_form() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .form_urlencoded_tuple("grant_type", "client_credentials")
                    .form_urlencoded_tuple("client_id", "client-1")
                    .form_urlencoded_tuple("client_secret", "secret-1");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({ "access_token": "abc-123", "expires_in": 1800, "token_type": "Bearer" }));
            })
            .await;

        let issued = api(&server, "account_id: acc-main").exchange().await.expect("token");

        token_mock.assert_calls_async(1).await;
        assert_eq!(issued.value, "abc-123");
        assert_eq!(issued.expires_in_seconds, 1800);
    }

    #[tokio::test]
    async fn credential_exchange_defaults_missing_expiry() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).json_body(json!({ "access_token": "abc-123" }));
            })
            .await;

        let issued = api(&server, "account_id: acc-main").exchange().await.expect("token");
        assert_eq!(issued.expires_in_seconds, 3600);
    }

    #[tokio::test]
    async fn refused_credentials_map_to_auth_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(401).json_body(json!({ "error": "invalid_client" }));
            })
            .await;

        let err = api(&server, "account_id: acc-main").exchange().await.err().expect("auth error");
        assert!(matches!(err, RefreshError::Auth(_)));
    }

    #[tokio::test]
    async fn server_errors_map_to_transport_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(503);
            })
            .await;

        let err = api(&server, "account_id: acc-main").exchange().await.err().expect("transport error");
        assert!(matches!(err, RefreshError::Transport(_)));
    }

    #[tokio::test]
    async fn job_status_reads_step_states_and_result_url() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/jobs/job-42")
                    .header("Authorization", "Bearer abc-123");
                then.status(200).json_body(json!({
                    "type": "job",
                    "id": "job-42",
                    "steps": [
                        { "title": "verify-credentials", "status": "success", "result": null },
                        { "title": "retrieve-accounts", "status": "success",
                          "result": { "type": "link", "url": "/users/user-1/accounts?filter=connection.id.eq('conn-1')" } },
                        { "title": "retrieve-transactions", "status": "in-progress", "result": null }
                    ]
                }));
            })
            .await;

        let job = api(&server, "account_id: acc-main")
            .job_status(&token(), "job-42")
            .await
            .expect("job");

        assert_eq!(job.state, JobState::Processing);
        assert_eq!(
            job.result_id.as_deref(),
            Some("/users/user-1/accounts?filter=connection.id.eq('conn-1')")
        );
    }

    #[tokio::test]
    async fn failed_step_marks_job_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/jobs/job-42");
                then.status(200).json_body(json!({
                    "id": "job-42",
                    "steps": [
                        { "title": "verify-credentials", "status": "failed",
                          "result": { "code": "user-action-required", "detail": "MFA required" } },
                        { "title": "retrieve-accounts", "status": "pending", "result": null }
                    ]
                }));
            })
            .await;

        let job = api(&server, "account_id: acc-main")
            .job_status(&token(), "job-42")
            .await
            .expect("job");

        assert_eq!(job.state, JobState::Failed);
        assert!(job.failure.as_deref().is_some_and(|f| f.contains("MFA required")));
    }

    #[tokio::test]
    async fn full_cycle_against_http_upstream() {
        let server = MockServer::start_async().await;
        let initiate = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/users/user-1/connections/conn-1/refresh")
                    .header("Authorization", "Bearer abc-123");
                then.status(202).json_body(json!({ "type": "job", "id": "job-42" }));
            })
            .await;
        let poll = server
            .mock_async(|when, then| {
                when.method(GET).path("/jobs/job-42");
                then.status(200).json_body(json!({
                    "id": "job-42",
                    "steps": [
                        { "title": "verify-credentials", "status": "success", "result": null },
                        { "title": "retrieve-accounts", "status": "success",
                          "result": { "url": "/users/user-1/accounts" } }
                    ]
                }));
            })
            .await;
        let accounts = server
            .mock_async(|when, then| {
                when.method(GET).path("/users/user-1/accounts");
                then.status(200).json_body(accounts_body());
            })
            .await;

        let api = std::sync::Arc::new(api(&server, "account_id: acc-main"));
        let policy = PollPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            timeout: Duration::from_secs(2),
        };
        let balance = UpstreamClient::new(api, policy)
            .fetch_balance(&token())
            .await
            .expect("balance");

        initiate.assert_calls_async(1).await;
        poll.assert_calls_async(1).await;
        accounts.assert_calls_async(1).await;
        assert_eq!(balance.amount, decimal("1542.55"));
        assert_eq!(balance.currency, "AUD");
    }

    #[tokio::test]
    async fn account_is_selected_by_institution() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/user-1/accounts");
                then.status(200).json_body(accounts_body());
            })
            .await;

        let job = FetchJob {
            job_id: "job-42".to_owned(),
            result_id: None,
            state: JobState::Succeeded,
            failure: None,
        };
        let by_plain_id = api(&server, "institution_id: AU00000")
            .read_result(&token(), &job)
            .await
            .expect("balance");
        let by_nested_id = api(&server, "institution_id: AU00001")
            .read_result(&token(), &job)
            .await
            .expect("balance");

        assert_eq!(by_plain_id.amount, decimal("250.10"));
        assert_eq!(by_nested_id.amount, decimal("1542.55"));
    }

    #[tokio::test]
    async fn missing_account_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/user-1/accounts");
                then.status(200).json_body(accounts_body());
            })
            .await;

        let job = FetchJob::submitted("job-42");
        let err = api(&server, "account_id: acc-closed")
            .read_result(&token(), &job)
            .await
            .err()
            .expect("account not found");

        match err {
            RefreshError::AccountNotFound(selector) => assert_eq!(selector, "account_id=acc-closed"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
