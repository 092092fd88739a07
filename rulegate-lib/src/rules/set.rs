use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::ast::Rule;
use super::factory::RuleFactory;
use crate::config::RuleConfig;
use crate::error::{Result, RuleGateError};
use crate::net::AccessLists;

/// An ordered, immutable list of compiled rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile `configs` in order.
    ///
    /// Fails on the first rule that does not parse, on a repeated id, or on a reference to
    /// an access list missing from `lists`. Nothing is returned unless every rule compiled.
    pub fn compile(configs: &[RuleConfig], factory: &RuleFactory, lists: &AccessLists) -> Result<Self> {
        let mut ids = HashSet::with_capacity(configs.len());
        let mut rules = Vec::with_capacity(configs.len());

        for cfg in configs {
            if !ids.insert(cfg.id) {
                return Err(RuleGateError::Config(format!("Duplicate rule id: {}", cfg.id)));
            }
            let rule = factory.new_rule(cfg.id, &cfg.rule)?;
            if let Some(missing) =
                rule.predicate().access_lists().into_iter().find(|name| !lists.is_defined(name))
            {
                return Err(RuleGateError::Config(format!(
                    "Rule {} references unknown access list: {missing}",
                    cfg.id
                )));
            }
            rules.push(rule);
        }

        info!(rules = rules.len(), "rule set compiled");
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

/// The active rule set, replaceable while evaluators keep reading the previous one
#[derive(Debug)]
pub struct SharedRuleSet {
    current: ArcSwap<RuleSet>,
}

impl SharedRuleSet {
    pub fn new(rules: RuleSet) -> Self {
        Self { current: ArcSwap::from_pointee(rules) }
    }

    /// Snapshot of the current rule set
    pub fn load(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    pub fn store(&self, rules: RuleSet) {
        self.current.store(Arc::new(rules));
    }

    /// Compile a new rule set and swap it in. On error the current set stays active.
    pub fn reload(
        &self,
        configs: &[RuleConfig],
        factory: &RuleFactory,
        lists: &AccessLists,
    ) -> Result<()> {
        let rules = RuleSet::compile(configs, factory, lists)?;
        self.store(rules);
        Ok(())
    }
}
