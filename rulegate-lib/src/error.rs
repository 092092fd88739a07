use std::time::Duration;
use thiserror::Error;

use crate::evaluator::EvaluationError;
use crate::net::CidrError;
use crate::rules::ParseError;

/// Errors that can occur while loading, compiling or evaluating rules
#[derive(Error, Debug)]
pub enum RuleGateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("CIDR error: {0}")]
    Cidr(#[from] CidrError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Timed out after {0:?} waiting for a rule parser")]
    PoolTimeout(Duration),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

pub type Result<T> = std::result::Result<T, RuleGateError>;
