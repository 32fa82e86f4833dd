use crate::engine::AlertEvaluator;
use chrono::Utc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Runs [`AlertEvaluator::run_cycle`] every `period`.
///
/// The first cycle starts one period after `run` is called. Cycles run
/// inline on the scheduler task, so two never overlap; ticks missed while
/// a cycle is slow are skipped.
pub struct EvaluationScheduler {
    evaluator: AlertEvaluator,
    period: Duration,
}

impl EvaluationScheduler {
    pub fn new(evaluator: AlertEvaluator, period: Duration) -> Self {
        Self { evaluator, period }
    }

    /// Returns the number of cycles run once `shutdown` fires. A cycle in
    /// progress when the signal arrives runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.period.as_secs(), "Alert evaluation started");

        let mut cycles = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.evaluator.run_cycle(Utc::now()).await;
                    cycles += 1;
                    if report.raised > 0 || report.resolved > 0 || report.failed > 0 {
                        tracing::info!(
                            raised = report.raised,
                            resolved = report.resolved,
                            failed = report.failed,
                            "Alert evaluation cycle"
                        );
                    }
                }
            }
        }

        tracing::info!(cycles, "Alert evaluation stopped");
        cycles
    }
}
