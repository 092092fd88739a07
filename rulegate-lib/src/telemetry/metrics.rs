use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::error::{Result, RuleGateError};
use crate::rules::RuleId;

pub mod labels {
    pub const ACTION: &str = "action";
    pub const RULE_ID: &str = "rule_id";
    pub const VERSION: &str = "version";
}

/// Prometheus counters for rule compilation and evaluation.
///
/// Every instance owns its own [`Registry`], so tests and embedders can keep several side by
/// side without clashing on metric names.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub evaluations_total: IntCounter,
    pub decisions_total: IntCounterVec,
    pub rule_matches_total: IntCounterVec,
    pub evaluation_errors_total: IntCounter,

    pub rules_compiled_total: IntCounter,
    pub rule_parse_errors_total: IntCounter,

    pub hit_table_entries: IntGauge,

    // Build info
    pub build_info: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let evaluations_total = IntCounter::new(
            "rulegate_evaluations_total",
            "Total number of requests evaluated against a rule list",
        )
        .map_err(metrics_error)?;
        let decisions_total = IntCounterVec::new(
            Opts::new("rulegate_decisions_total", "Decisions returned, by action label"),
            &[labels::ACTION],
        )
        .map_err(metrics_error)?;
        let rule_matches_total = IntCounterVec::new(
            Opts::new("rulegate_rule_matches_total", "Requests matched, by rule id"),
            &[labels::RULE_ID],
        )
        .map_err(metrics_error)?;
        let evaluation_errors_total = IntCounter::new(
            "rulegate_evaluation_errors_total",
            "Evaluations aborted by an address family mismatch",
        )
        .map_err(metrics_error)?;
        let rules_compiled_total =
            IntCounter::new("rulegate_rules_compiled_total", "Rules compiled successfully")
                .map_err(metrics_error)?;
        let rule_parse_errors_total =
            IntCounter::new("rulegate_rule_parse_errors_total", "Rule texts rejected by the parser")
                .map_err(metrics_error)?;
        let hit_table_entries =
            IntGauge::new("rulegate_hit_table_entries", "Client addresses tracked in the hit table")
                .map_err(metrics_error)?;
        let build_info = IntCounterVec::new(
            Opts::new("rulegate_build_info", "Build information"),
            &[labels::VERSION],
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(evaluations_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(decisions_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(rule_matches_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(evaluation_errors_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(rules_compiled_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(rule_parse_errors_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(hit_table_entries.clone())).map_err(metrics_error)?;
        registry.register(Box::new(build_info.clone())).map_err(metrics_error)?;

        build_info.with_label_values(&[env!("CARGO_PKG_VERSION")]).inc();

        Ok(Self {
            registry,
            evaluations_total,
            decisions_total,
            rule_matches_total,
            evaluation_errors_total,
            rules_compiled_total,
            rule_parse_errors_total,
            hit_table_entries,
            build_info,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_decision(&self, action: &str, rule_id: Option<RuleId>) {
        self.evaluations_total.inc();
        self.decisions_total.with_label_values(&[action]).inc();
        if let Some(id) = rule_id {
            self.rule_matches_total.with_label_values(&[&id.to_string()]).inc();
        }
    }

    pub fn record_evaluation_error(&self) {
        self.evaluations_total.inc();
        self.evaluation_errors_total.inc();
    }

    pub fn set_hit_table_entries(&self, entries: usize) {
        self.hit_table_entries.set(i64::try_from(entries).unwrap_or(i64::MAX));
    }

    /// Render every registered metric in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| RuleGateError::Metrics(format!("Failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| RuleGateError::Metrics(format!("Metrics output is not UTF-8: {e}")))
    }
}

fn metrics_error(e: prometheus::Error) -> RuleGateError {
    RuleGateError::Metrics(format!("Failed to register metric: {e}"))
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.record_decision("reject", Some(7));
        metrics.record_decision("accept", None);
        metrics.record_evaluation_error();
        metrics.set_hit_table_entries(3);

        let text = metrics.encode()?;
        assert!(text.contains("rulegate_evaluations_total 3"));
        assert!(text.contains(r#"rulegate_decisions_total{action="reject"} 1"#));
        assert!(text.contains(r#"rulegate_rule_matches_total{rule_id="7"} 1"#));
        assert!(text.contains("rulegate_evaluation_errors_total 1"));
        assert!(text.contains("rulegate_hit_table_entries 3"));
        Ok(())
    }

    #[test]
    fn test_instances_are_independent() -> Result<()> {
        let a = Metrics::new()?;
        let b = Metrics::new()?;
        a.rules_compiled_total.inc();
        assert_eq!(a.rules_compiled_total.get(), 1);
        assert_eq!(b.rules_compiled_total.get(), 0);
        Ok(())
    }
}
