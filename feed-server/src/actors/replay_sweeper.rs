// feed-server/src/actors/replay_sweeper.rs
use actix::{Actor, AsyncContext, Context, Handler, Message, MessageResult};
use common::unix_now;
use std::sync::Arc;
use std::time::Duration;

use crate::replay::ReplayGuard;

/// Actor message: sweep expired token ids now
#[derive(Message)]
#[rtype(result = "usize")]
pub struct SweepNow;

/// Periodically evicts expired entries from the replay guard
pub struct ReplaySweeper {
    guard: Arc<ReplayGuard>,
    interval: Duration,
}

impl ReplaySweeper {
    pub fn new(guard: Arc<ReplayGuard>, interval: Duration) -> Self {
        Self { guard, interval }
    }

    fn sweep(&self) -> usize {
        let removed = self.guard.sweep(unix_now());
        if removed > 0 {
            tracing::info!(
                "Evicted {} expired token ids, {} still tracked",
                removed,
                self.guard.len()
            );
        }
        removed
    }
}

impl Actor for ReplaySweeper {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("ReplaySweeper started with interval: {:?}", self.interval);

        ctx.run_interval(self.interval, |act, _ctx| {
            act.sweep();
        });
    }
}

impl Handler<SweepNow> for ReplaySweeper {
    type Result = MessageResult<SweepNow>;

    fn handle(&mut self, _msg: SweepNow, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.sweep())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_periodic_sweep_evicts_expired() {
        let guard = Arc::new(ReplayGuard::new());
        guard.try_register("expired", unix_now() - 10, unix_now() - 20);
        guard.try_register("live", unix_now() + 600, unix_now());

        let _sweeper = ReplaySweeper::new(guard.clone(), Duration::from_millis(10)).start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(guard.len(), 1);
        assert!(guard.contains("live", unix_now()));
    }

    #[actix_web::test]
    async fn test_sweep_now_reports_count() {
        let guard = Arc::new(ReplayGuard::new());
        guard.try_register("a", unix_now() - 10, unix_now() - 20);
        guard.try_register("b", unix_now() - 5, unix_now() - 20);

        let sweeper = ReplaySweeper::new(guard.clone(), Duration::from_secs(3600)).start();
        assert_eq!(sweeper.send(SweepNow).await.unwrap(), 2);
        assert!(guard.is_empty());
    }
}
