//! Rule evaluation against a request.
//!
//! A request is counted in the hit table first, then rules are tried in list order. The
//! first rule whose predicate holds decides the action and is recorded as a match for the
//! client; when none holds the evaluator's default action is returned and no match is
//! recorded.

use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::Result;
use crate::hits::HitTable;
use crate::net::address::embedded_ipv4;
use crate::net::{AccessLists, AddressFamilyError};
use crate::request::RequestInfo;
use crate::rules::{Predicate, Rule, RuleId};
use crate::telemetry::Metrics;

/// Facts a predicate can read. Implementations must not change while a predicate runs.
pub trait EvaluationContext {
    fn address(&self) -> IpAddr;
    fn host(&self) -> Option<&str>;
    fn header(&self, name: &str) -> Option<&str>;
    /// Hits for the client, including the request being evaluated
    fn hits(&self) -> u64;
    fn in_list(&self, list: &str) -> bool;
}

/// [`EvaluationContext`] over a [`RequestInfo`] and a hit count taken once per request
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    request: &'a RequestInfo,
    hits: u64,
    access_lists: &'a AccessLists,
}

impl<'a> RequestContext<'a> {
    pub fn new(request: &'a RequestInfo, hits: u64, access_lists: &'a AccessLists) -> Self {
        Self { request, hits, access_lists }
    }
}

impl EvaluationContext for RequestContext<'_> {
    fn address(&self) -> IpAddr {
        self.request.address()
    }

    fn host(&self) -> Option<&str> {
        self.request.host()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    fn hits(&self) -> u64 {
        self.hits
    }

    fn in_list(&self, list: &str) -> bool {
        self.access_lists.contains(list, &self.request.address())
    }
}

impl Predicate {
    /// Evaluate the tree against `ctx`.
    ///
    /// `&&` and `||` evaluate children left to right and stop at the first child that
    /// decides the result. An IPv4 block tested against an IPv6 client that carries no IPv4
    /// address is an error, never a plain `false`.
    pub fn evaluate(
        &self,
        ctx: &dyn EvaluationContext,
    ) -> std::result::Result<bool, AddressFamilyError> {
        let holds = match self {
            Predicate::IpEquals(literal) => same_address(literal, &ctx.address()),
            Predicate::IpMatches(block) => block.contains(&ctx.address())?,
            Predicate::IpInList(name) => ctx.in_list(name),
            Predicate::HostEquals(host) => ctx.host() == Some(host.as_str()),
            Predicate::HostMatches(pattern) => ctx.host().is_some_and(|h| pattern.is_full_match(h)),
            Predicate::HeaderEquals { name, value } => ctx.header(name) == Some(value.as_str()),
            Predicate::HeaderMatches { name, pattern } => {
                ctx.header(name).is_some_and(|v| pattern.is_full_match(v))
            }
            Predicate::HitsGreaterThan(threshold) => ctx.hits() > *threshold,
            Predicate::Negation(child) => !child.evaluate(ctx)?,
            Predicate::Conjunction(children) => {
                for child in children {
                    if !child.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                true
            }
            Predicate::Disjunction(children) => {
                for child in children {
                    if child.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                false
            }
        };
        Ok(holds)
    }
}

/// Byte equality, looking through IPv4-mapped and IPv4-compatible IPv6 forms when the
/// families differ.
fn same_address(literal: &IpAddr, addr: &IpAddr) -> bool {
    match (literal, addr) {
        (IpAddr::V4(a), IpAddr::V4(b)) => a == b,
        (IpAddr::V6(a), IpAddr::V6(b)) => a == b,
        (IpAddr::V4(v4), IpAddr::V6(v6)) | (IpAddr::V6(v6), IpAddr::V4(v4)) => {
            embedded_ipv4(v6).is_some_and(|embedded| embedded == *v4)
        }
    }
}

/// A rule failed to evaluate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule {rule_id}: {source}")]
pub struct EvaluationError {
    pub rule_id: RuleId,
    #[source]
    pub source: AddressFamilyError,
}

/// Outcome of evaluating a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision<'a> {
    pub action: &'a str,
    /// The rule that decided, `None` when the default action applied
    pub rule_id: Option<RuleId>,
}

impl Decision<'_> {
    pub fn is_default(&self) -> bool {
        self.rule_id.is_none()
    }
}

/// Applies ordered rule lists to requests, counting hits and matches per client
#[derive(Debug)]
pub struct RuleEvaluator {
    hit_table: Arc<HitTable>,
    access_lists: Arc<AccessLists>,
    default_action: String,
    metrics: Option<Arc<Metrics>>,
}

impl RuleEvaluator {
    pub fn new(hit_table: Arc<HitTable>, default_action: impl Into<String>) -> Self {
        Self {
            hit_table,
            access_lists: Arc::new(AccessLists::new()),
            default_action: default_action.into(),
            metrics: None,
        }
    }

    /// Lists consulted by `IP in <name>` predicates
    pub fn with_access_lists(mut self, access_lists: Arc<AccessLists>) -> Self {
        self.access_lists = access_lists;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn hit_table(&self) -> &Arc<HitTable> {
        &self.hit_table
    }

    pub fn default_action(&self) -> &str {
        &self.default_action
    }

    /// Action for `request`: the first matching rule's, or the default.
    pub fn action<'a>(&'a self, request: &RequestInfo, rules: &'a [Rule]) -> Result<&'a str> {
        Ok(self.decide(request, rules)?.action)
    }

    /// Like [`RuleEvaluator::action`], also reporting which rule decided.
    pub fn decide<'a>(&'a self, request: &RequestInfo, rules: &'a [Rule]) -> Result<Decision<'a>> {
        let address = request.address();
        let hits = self.hit_table.record_hit(&address);
        let ctx = RequestContext::new(request, hits, &self.access_lists);

        let decision = match first_match(&ctx, rules) {
            Ok(Some(rule)) => {
                self.hit_table.record_match(&address, rule.id());
                debug!(rule_id = rule.id(), action = rule.action(), %address, hits, "rule matched");
                Decision { action: rule.action(), rule_id: Some(rule.id()) }
            }
            Ok(None) => Decision { action: self.default_action.as_str(), rule_id: None },
            Err(err) => {
                warn!(rule_id = err.rule_id, %address, error = %err.source, "rule evaluation failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_evaluation_error();
                }
                return Err(err.into());
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.action, decision.rule_id);
            // a first hit created the entry; the sweeper resets the gauge to the exact size
            if hits == 1 {
                metrics.hit_table_entries.inc();
            }
        }
        Ok(decision)
    }
}

/// The first rule, in list order, whose predicate holds for `ctx`. Rules after it are not
/// evaluated.
pub fn first_match<'r>(
    ctx: &dyn EvaluationContext,
    rules: &'r [Rule],
) -> std::result::Result<Option<&'r Rule>, EvaluationError> {
    for rule in rules {
        let holds = rule
            .predicate()
            .evaluate(ctx)
            .map_err(|source| EvaluationError { rule_id: rule.id(), source })?;
        if holds {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}
