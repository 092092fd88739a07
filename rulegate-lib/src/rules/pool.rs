use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

use super::parser::Parser;

/// Default maximum number of parser instances
pub const DEFAULT_POOL_CAPACITY: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("timed out after {0:?} waiting for a rule parser")]
    Timeout(Duration),
}

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<Parser>,
    created: usize,
    /// Tickets of blocked callers, oldest first
    waiting: VecDeque<u64>,
    next_ticket: u64,
}

impl PoolState {
    fn is_turn(&self, ticket: u64) -> bool {
        self.waiting.front() == Some(&ticket) && !self.idle.is_empty()
    }
}

/// Bounded pool of reusable [`Parser`] instances.
///
/// Parsers are created lazily up to `capacity`. Once that many exist and all are borrowed,
/// [`ParserPool::acquire`] blocks until one is returned, or until the configured
/// acquisition timeout elapses. Blocked callers are served in arrival order, and a caller
/// arriving while others wait queues behind them even if a parser is idle.
#[derive(Debug)]
pub struct ParserPool {
    state: Mutex<PoolState>,
    returned: Condvar,
    capacity: usize,
    acquire_timeout: Option<Duration>,
}

impl ParserPool {
    /// Create a pool holding at most `capacity` parsers (at least one).
    ///
    /// With `acquire_timeout = None` callers wait indefinitely for a parser.
    pub fn new(capacity: usize, acquire_timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
            capacity: capacity.max(1),
            acquire_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of parser instances created so far.
    pub fn created(&self) -> usize {
        self.lock().created
    }

    /// Number of parsers currently sitting idle in the pool.
    pub fn idle(&self) -> usize {
        self.lock().idle.len()
    }

    /// Number of callers blocked in [`ParserPool::acquire`].
    pub fn waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Borrow a parser. It goes back to the pool when the returned guard is dropped.
    pub fn acquire(&self) -> Result<PooledParser<'_>, PoolError> {
        let mut state = self.lock();
        if state.waiting.is_empty() {
            if let Some(parser) = state.idle.pop() {
                return Ok(PooledParser { parser, pool: self });
            }
            if state.created < self.capacity {
                state.created += 1;
                trace!(created = state.created, capacity = self.capacity, "creating rule parser");
                return Ok(PooledParser { parser: Parser::new(), pool: self });
            }
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.waiting.push_back(ticket);
        trace!(capacity = self.capacity, queued = state.waiting.len(), "parser pool exhausted, waiting");

        let not_my_turn = |s: &mut PoolState| !s.is_turn(ticket);
        let mut state = match self.acquire_timeout {
            None => self
                .returned
                .wait_while(state, not_my_turn)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (mut guard, _) = self
                    .returned
                    .wait_timeout_while(state, timeout, not_my_turn)
                    .unwrap_or_else(PoisonError::into_inner);
                if !guard.is_turn(ticket) {
                    guard.waiting.retain(|&t| t != ticket);
                    drop(guard);
                    // the next caller in line may already have a parser waiting for it
                    self.returned.notify_all();
                    return Err(PoolError::Timeout(timeout));
                }
                guard
            }
        };

        state.waiting.pop_front();
        let parser = state.idle.pop();
        let more = !state.idle.is_empty() && !state.waiting.is_empty();
        drop(state);
        if more {
            self.returned.notify_all();
        }
        match parser {
            Some(parser) => Ok(PooledParser { parser, pool: self }),
            // is_turn guarantees an idle parser
            None => Err(PoolError::Timeout(self.acquire_timeout.unwrap_or_default())),
        }
    }

    fn release(&self, parser: Parser) {
        let mut state = self.lock();
        state.idle.push(parser);
        let wake = !state.waiting.is_empty();
        drop(state);
        if wake {
            // waiters check their own ticket, so every one of them has to look
            self.returned.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // the state is a plain free list, still consistent after a panicking holder
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ParserPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, None)
    }
}

/// A parser on loan from a [`ParserPool`]
pub struct PooledParser<'a> {
    parser: Parser,
    pool: &'a ParserPool,
}

impl Deref for PooledParser<'_> {
    type Target = Parser;

    fn deref(&self) -> &Parser {
        &self.parser
    }
}

impl DerefMut for PooledParser<'_> {
    fn deref_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }
}

impl Drop for PooledParser<'_> {
    fn drop(&mut self) {
        // leaves an empty parser behind
        self.pool.release(std::mem::take(&mut self.parser));
    }
}
