#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod evaluator;
pub mod hits;
pub mod net;
pub mod request;
pub mod rules;
pub mod telemetry;

pub use config::{load_from_path, load_from_str, Config, RuleConfig};
pub use error::{Result, RuleGateError};
pub use evaluator::{
    first_match, Decision, EvaluationContext, EvaluationError, RequestContext, RuleEvaluator,
};
pub use hits::{spawn_sweeper, HitTable};
pub use net::{parse_address, AccessLists, AddressFamilyError, CidrBlock, CidrError};
pub use request::RequestInfo;
pub use rules::{ParseError, Predicate, Rule, RuleFactory, RuleId, RuleSet, SharedRuleSet};
