//! Rule language: lexing, parsing, compiled rule trees and the factory that builds them.

pub mod ast;
pub mod error;
pub mod factory;
mod lexer;
pub mod parser;
pub mod pool;
pub mod set;

pub use ast::{Pattern, Predicate, Rule, RuleId};
pub use error::{ParseError, ParseErrorKind, Position};
pub use factory::RuleFactory;
pub use parser::{Parser, MAX_NESTING_DEPTH};
pub use pool::{ParserPool, PoolError, PooledParser, DEFAULT_POOL_CAPACITY};
pub use set::{RuleSet, SharedRuleSet};
