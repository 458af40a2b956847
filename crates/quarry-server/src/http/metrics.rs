use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use quarry_core::PipelineState;
use std::time::Duration;

// ── Label types ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabel {
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StageLabel {
    pub stage: String,
}

/// How a run ended, as reported on `quarry_runs_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage did its work.
    Ok,
    /// Completed with at least one stage failure.
    Degraded,
    /// Diverted by the threat screen.
    Blocked,
    /// Could not start.
    Rejected,
}

impl RunOutcome {
    pub fn of(state: &PipelineState) -> Self {
        if !state.safe {
            RunOutcome::Blocked
        } else if state.failures.is_empty() {
            RunOutcome::Ok
        } else {
            RunOutcome::Degraded
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Ok => "ok",
            RunOutcome::Degraded => "degraded",
            RunOutcome::Blocked => "blocked",
            RunOutcome::Rejected => "rejected",
        }
    }
}

// ── Metrics registry ───────────────────────────────────────────────────────────

pub struct QuarryMetrics {
    pub registry: Registry,

    // Pipeline
    pub runs: Family<OutcomeLabel, Counter>,
    pub stage_failures: Family<StageLabel, Counter>,
    pub run_duration: Histogram,

    // Gauges set at scrape time
    pub indexed_documents: Gauge,
    pub conversations: Gauge,
    pub uptime_seconds: Gauge,
}

impl QuarryMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let runs: Family<OutcomeLabel, Counter> = Family::default();
        registry.register(
            "quarry_runs",
            "Pipeline runs by outcome",
            runs.clone(),
        );

        let stage_failures: Family<StageLabel, Counter> = Family::default();
        registry.register(
            "quarry_stage_failures",
            "Recorded stage failures by stage",
            stage_failures.clone(),
        );

        let run_duration = Histogram::new([0.1_f64, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0].into_iter());
        registry.register(
            "quarry_run_duration_seconds",
            "Wall-clock duration of pipeline runs",
            run_duration.clone(),
        );

        let indexed_documents: Gauge = Gauge::default();
        registry.register(
            "quarry_indexed_documents",
            "Documents in the similarity index",
            indexed_documents.clone(),
        );

        let conversations: Gauge = Gauge::default();
        registry.register(
            "quarry_conversations",
            "Live conversations in the history cache",
            conversations.clone(),
        );

        let uptime_seconds: Gauge = Gauge::default();
        registry.register(
            "quarry_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds.clone(),
        );

        Self {
            registry,
            runs,
            stage_failures,
            run_duration,
            indexed_documents,
            conversations,
            uptime_seconds,
        }
    }

    pub fn observe_run(&self, state: &PipelineState, elapsed: Duration) {
        self.record_outcome(RunOutcome::of(state), elapsed);
        for failure in &state.failures {
            self.stage_failures
                .get_or_create(&StageLabel {
                    stage: failure.stage().to_string(),
                })
                .inc();
        }
    }

    pub fn record_outcome(&self, outcome: RunOutcome, elapsed: Duration) {
        self.runs
            .get_or_create(&OutcomeLabel {
                outcome: outcome.as_str().to_string(),
            })
            .inc();
        self.run_duration.observe(elapsed.as_secs_f64());
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for QuarryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_observed_runs() {
        let metrics = QuarryMetrics::new();
        metrics.record_outcome(RunOutcome::Blocked, Duration::from_millis(30));
        metrics.indexed_documents.set(12);

        let text = metrics.render().unwrap();
        assert!(text.contains("quarry_runs_total{outcome=\"blocked\"} 1"));
        assert!(text.contains("quarry_indexed_documents 12"));
        assert!(text.contains("quarry_run_duration_seconds_count 1"));
        assert!(text.ends_with("# EOF\n"));
    }
}
