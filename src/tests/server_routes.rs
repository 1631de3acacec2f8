#[cfg(test)]
mod test {

    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use anyhow::Result;
    use chrono::Duration as ChronoDuration;
    use serde_json::Value;

    use crate::cache::balance::{BalanceStatus, CachedBalance};
    use crate::cache::store::MemoryStore;
    use crate::cache::token::AccessToken;
    use crate::config::settings::SettingsConfig;
    use crate::server::routes::{BalanceResponse, BalanceState};
    use crate::server::server::app;
    use crate::sources::job::JobState;
    use crate::tests::common::{
        build_reqwest_client, decimal, fast_poll, harness, spawn_axum, t0, Harness, ScriptedApi,
    };

    fn cached_balance() -> CachedBalance {
        CachedBalance {
            amount: Some(decimal("1000.00")),
            currency: Some("AUD".to_owned()),
            fetched_at: Some(t0() - ChronoDuration::hours(2)),
            status: BalanceStatus::Fresh,
        }
    }

    type TestState = BalanceState<ScriptedApi, MemoryStore<AccessToken>, MemoryStore<CachedBalance>>;

    fn state(h: &Harness, request_timeout: Duration) -> TestState {
        BalanceState { coordinator: h.coordinator.clone(), request_timeout }
    }

    #[tokio::test]
    async fn get_balance_serves_cached_value() -> Result<()> {
        let h = harness(ScriptedApi::new("1542.55", "AUD"), MemoryStore::with_value(cached_balance()), fast_poll()).await;
        let (_server, addr) = spawn_axum(state(&h, Duration::from_secs(5)).router()).await;

        let body: Value = build_reqwest_client()
            .get(format!("http://{}/get-balance", addr))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        assert_eq!(body["amount"], "1000.00");
        assert_eq!(body["currency"], "AUD");
        assert_eq!(body["status"], "fresh");
        assert!(body.get("refreshed").is_none());
        assert!(body.get("error").is_none());
        assert_eq!(h.api.upstream_calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn get_balance_refreshes_empty_cache() -> Result<()> {
        let h = harness(ScriptedApi::new("1542.55", "AUD"), MemoryStore::new(), fast_poll()).await;
        let (_server, addr) = spawn_axum(state(&h, Duration::from_secs(5)).router()).await;

        let body: BalanceResponse = build_reqwest_client()
            .get(format!("http://{}/get-balance", addr))
            .send()
            .await?
            .json()
            .await?;

        assert_eq!(body.amount, Some(decimal("1542.55")));
        assert_eq!(body.status, BalanceStatus::Fresh);
        Ok(())
    }

    #[tokio::test]
    async fn slow_refresh_falls_back_to_cached_value() -> Result<()> {
        let api = ScriptedApi::new("1542.55", "AUD").with_initiate_delay(Duration::from_millis(500));
        let h = harness(api, MemoryStore::new(), fast_poll()).await;
        let (_server, addr) = spawn_axum(state(&h, Duration::from_millis(50)).router()).await;

        let body: BalanceResponse = build_reqwest_client()
            .get(format!("http://{}/get-balance", addr))
            .send()
            .await?
            .json()
            .await?;

        assert_eq!(body.amount, None);
        assert_eq!(body.status, BalanceStatus::Stale);
        assert!(h.coordinator.is_refreshing());
        Ok(())
    }

    #[tokio::test]
    async fn forced_refresh_reports_success() -> Result<()> {
        let h = harness(ScriptedApi::new("1542.55", "AUD"), MemoryStore::with_value(cached_balance()), fast_poll()).await;
        let (_server, addr) = spawn_axum(state(&h, Duration::from_secs(5)).router()).await;
        let client = build_reqwest_client();

        let posted: BalanceResponse = client
            .post(format!("http://{}/refresh-balance", addr))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(posted.refreshed, Some(true));
        assert_eq!(posted.amount, Some(decimal("1542.55")));
        assert_eq!(posted.status, BalanceStatus::Fresh);

        let fetched: BalanceResponse = client
            .get(format!("http://{}/refresh-balance", addr))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(fetched.refreshed, Some(true));
        assert_eq!(h.api.initiations.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_hides_upstream_detail() -> Result<()> {
        let api = ScriptedApi::new("1542.55", "AUD").with_default_job_state(JobState::Failed);
        let h = harness(api, MemoryStore::with_value(cached_balance()), fast_poll()).await;
        let (_server, addr) = spawn_axum(state(&h, Duration::from_secs(5)).router()).await;

        let raw = build_reqwest_client()
            .post(format!("http://{}/refresh-balance", addr))
            .send()
            .await?
            .text()
            .await?;
        let body: Value = serde_json::from_str(&raw)?;

        assert_eq!(body["refreshed"], false);
        assert_eq!(body["status"], "error");
        assert_eq!(body["amount"], "1000.00");
        assert_eq!(body["error"], "Unable to fetch balance");
        assert!(!raw.contains("verify-credentials"));
        assert!(!raw.contains("token-1"));
        Ok(())
    }

    #[tokio::test]
    async fn app_exposes_health_and_metrics() -> Result<()> {
        let h = harness(ScriptedApi::new("1542.55", "AUD"), MemoryStore::new(), fast_poll()).await;
        let mut settings = SettingsConfig::default();
        settings.metrics.is_enabled = true;
        let (_server, addr) = spawn_axum(app(&settings, state(&h, Duration::from_secs(5))).await).await;
        let client = build_reqwest_client();

        let health = client.get(format!("http://{}/health", addr)).send().await?;
        assert!(health.status().is_success());
        assert_eq!(health.text().await?, "ok");

        client.get(format!("http://{}/get-balance", addr)).send().await?;
        let metrics = client
            .get(format!("http://{}/metrics", addr))
            .send()
            .await?
            .text()
            .await?;
        assert!(metrics.contains("balanceagent_balance_requests_total"));
        assert!(metrics.contains("balanceagent_refresh_cycles_total"));
        Ok(())
    }
}
