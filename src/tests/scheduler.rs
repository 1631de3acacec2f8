#[cfg(test)]
mod test {

    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::cache::store::MemoryStore;
    use crate::coordinator::scheduler::loop_refresh_stale_balance;
    use crate::tests::common::{fast_poll, harness, ScriptedApi};

    const TICK: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn scheduler_refreshes_only_stale_balance() {
        let h = harness(ScriptedApi::new("1542.55", "AUD"), MemoryStore::new(), fast_poll()).await;
        let scheduler = tokio::spawn(loop_refresh_stale_balance(h.coordinator.clone(), TICK));

        // first tick fires at once on the empty cache
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.api.initiations.load(Ordering::SeqCst), 1);

        tokio::time::sleep(TICK).await;
        assert_eq!(h.api.initiations.load(Ordering::SeqCst), 1, "fresh balance is left alone");

        h.clock.advance(25 * 3600);
        tokio::time::sleep(TICK).await;
        assert_eq!(h.api.initiations.load(Ordering::SeqCst), 2);

        scheduler.abort();
    }
}
