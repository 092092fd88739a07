use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::ast::{Rule, RuleId};
use super::pool::{ParserPool, PoolError};
use crate::error::{Result, RuleGateError};
use crate::telemetry::Metrics;

/// Compiles rule text into [`Rule`]s.
///
/// Shared by reference between any number of threads; parsers come from an internal
/// [`ParserPool`], so contention is limited to borrowing and returning a parser.
#[derive(Debug)]
pub struct RuleFactory {
    pool: ParserPool,
    metrics: Option<Arc<Metrics>>,
}

impl RuleFactory {
    /// # Arguments
    /// * `capacity` - Maximum number of parser instances
    /// * `acquire_timeout` - How long to wait for a parser once all are busy, `None` to wait
    ///   indefinitely
    /// * `metrics` - Optional counters for compiled and rejected rules
    pub fn new(
        capacity: usize,
        acquire_timeout: Option<Duration>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self { pool: ParserPool::new(capacity, acquire_timeout), metrics }
    }

    pub fn pool(&self) -> &ParserPool {
        &self.pool
    }

    /// Parse `text` into a rule identified by `id`.
    pub fn new_rule(&self, id: RuleId, text: &str) -> Result<Rule> {
        let mut parser = self.pool.acquire().map_err(|PoolError::Timeout(waited)| {
            warn!(rule_id = id, ?waited, "no rule parser available");
            RuleGateError::PoolTimeout(waited)
        })?;

        match parser.parse(id, text) {
            Ok(rule) => {
                debug!(rule_id = id, rule = %rule, "rule compiled");
                if let Some(metrics) = &self.metrics {
                    metrics.rules_compiled_total.inc();
                }
                Ok(rule)
            }
            Err(e) => {
                warn!(rule_id = id, error = %e, text, "rule rejected");
                if let Some(metrics) = &self.metrics {
                    metrics.rule_parse_errors_total.inc();
                }
                Err(e.into())
            }
        }
    }
}

impl Default for RuleFactory {
    fn default() -> Self {
        Self { pool: ParserPool::default(), metrics: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Predicate;

    #[test]
    fn test_new_rule() -> Result<()> {
        let factory = RuleFactory::default();
        let rule = factory.new_rule(42, "Hits > 3 => throttle")?;
        assert_eq!(rule.id(), 42);
        assert_eq!(rule.action(), "throttle");
        assert_eq!(rule.predicate(), &Predicate::HitsGreaterThan(3));
        Ok(())
    }

    #[test]
    fn test_parse_error_is_surfaced() {
        let factory = RuleFactory::default();
        let result = factory.new_rule(1, "IP = 192.168.0.1");
        assert!(matches!(result, Err(RuleGateError::Parse(_))));
        // the parser went back to the pool
        assert_eq!(factory.pool().idle(), factory.pool().created());
    }

    #[test]
    fn test_metrics_recorded() -> Result<()> {
        let metrics = Arc::new(Metrics::new()?);
        let factory = RuleFactory::new(2, None, Some(Arc::clone(&metrics)));
        factory.new_rule(1, "Host = \"a\" => reject")?;
        assert!(factory.new_rule(2, "Host = => reject").is_err());
        assert_eq!(metrics.rules_compiled_total.get(), 1);
        assert_eq!(metrics.rule_parse_errors_total.get(), 1);
        Ok(())
    }

    #[test]
    fn test_pool_timeout_maps_to_error() -> Result<()> {
        let factory = RuleFactory::new(1, Some(Duration::from_millis(20)), None);
        let _held = factory.pool().acquire().map_err(|PoolError::Timeout(d)| {
            RuleGateError::PoolTimeout(d)
        })?;
        let result = factory.new_rule(1, "Hits > 1 => reject");
        assert!(matches!(result, Err(RuleGateError::PoolTimeout(_))));
        Ok(())
    }
}
