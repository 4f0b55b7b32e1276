//! Advice chain state machine.
//!
//! A controller owns the ordered pointcuts of one join point and a cursor into
//! them. Every `proceed()` advances the cursor one step (next advice, next
//! pointcut, or the original join point) and restores it on the way back out,
//! so the same controller can be driven again once a call returns. Cursors are
//! never shared: concurrent callers work on [`deep_copy`](JoinPointController::deep_copy)s.

use std::fmt;
use std::sync::Arc;

use super::chain::{AdviceRef, Pointcut};
use super::{JoinPoint, Value};
use crate::error::{Error, Result};
use crate::expression::{ExpressionContext, MatchEnv};

/// Observable phase of a chain walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    NotStarted,
    AdviceActive { pointcut: usize, advice: usize },
    /// The cursor just crossed from one pointcut's advices to the next.
    PointcutSwitch { from: usize, to: usize },
    OriginalInvoked,
    Returned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Start,
    At { pointcut: usize, advice: usize },
    Original,
}

/// What the next `proceed()` has to run.
#[derive(Debug, Clone)]
pub enum Step {
    Advice(AdviceRef),
    Original,
}

/// Alternative walk over a chain, e.g. one that bypasses or reorders advice.
pub trait ChainStrategy: Send + Sync {
    fn proceed(&self, join_point: &mut JoinPoint<'_>) -> Result<Value>;
}

#[derive(Clone, Default)]
pub enum ExecutionModel {
    /// Pointcut order, then advice order, then the original.
    #[default]
    Linear,
    Custom(Arc<dyn ChainStrategy>),
}

impl fmt::Debug for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionModel::Linear => f.write_str("Linear"),
            ExecutionModel::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinPointController {
    join_point: String,
    pointcuts: Vec<Pointcut>,
    model: ExecutionModel,
    position: Position,
    history: Vec<Position>,
    state: ChainState,
}

impl JoinPointController {
    pub fn new(join_point: impl Into<String>, pointcuts: Vec<Pointcut>) -> Self {
        Self {
            join_point: join_point.into(),
            pointcuts,
            model: ExecutionModel::Linear,
            position: Position::Start,
            history: Vec::new(),
            state: ChainState::NotStarted,
        }
    }

    pub fn with_model(mut self, model: ExecutionModel) -> Self {
        self.model = model;
        self
    }

    pub fn join_point(&self) -> &str {
        &self.join_point
    }

    pub fn pointcuts(&self) -> &[Pointcut] {
        &self.pointcuts
    }

    pub fn model(&self) -> &ExecutionModel {
        &self.model
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn advice_count(&self) -> usize {
        self.pointcuts.iter().map(|p| p.advices.len()).sum()
    }

    /// Independent copy, cursor included.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// The advice the cursor points at, if any.
    pub fn current_advice(&self) -> Option<&AdviceRef> {
        match self.position {
            Position::At { pointcut, advice } => self.pointcuts.get(pointcut)?.advices.get(advice),
            _ => None,
        }
    }

    /// The pointcut holding the current advice.
    pub fn current_pointcut(&self) -> Option<&Pointcut> {
        match self.position {
            Position::At { pointcut, .. } => self.pointcuts.get(pointcut),
            _ => None,
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.position {
            Position::Start => Ok(()),
            _ => Err(Error::internal(&self.join_point, "advice chain modified while in flight")),
        }
    }

    /// Keep the first occurrence of the advice `name`, drop the rest.
    /// Returns the number of dropped occurrences.
    pub fn clear_redundancy(&mut self, name: &str) -> Result<usize> {
        self.ensure_idle()?;
        let mut seen = false;
        let mut removed = 0;
        for pointcut in &mut self.pointcuts {
            pointcut.advices.retain(|advice| {
                if advice.name != name {
                    return true;
                }
                if seen {
                    removed += 1;
                    return false;
                }
                seen = true;
                true
            });
        }
        Ok(removed)
    }

    /// [`clear_redundancy`](Self::clear_redundancy) for every advice name, then
    /// drop pointcuts left without advice.
    pub fn clear_all_redundancies(&mut self) -> Result<usize> {
        self.ensure_idle()?;
        let mut names: Vec<String> = Vec::new();
        for advice in self.pointcuts.iter().flat_map(|p| p.advices.iter()) {
            if !names.contains(&advice.name) {
                names.push(advice.name.clone());
            }
        }
        let mut removed = 0;
        for name in &names {
            removed += self.clear_redundancy(name)?;
        }
        self.pointcuts.retain(|p| !p.is_empty());
        if removed > 0 {
            tracing::debug!(join_point = %self.join_point, removed, "cleared redundant advice");
        }
        Ok(removed)
    }

    /// Whether advice may run for this call: true unless the chain has cflow
    /// pointcuts and none of them holds on the live stack.
    pub fn is_gate_open(&self, ctx: &ExpressionContext, env: &MatchEnv<'_>) -> Result<bool> {
        cflow_gate(&self.pointcuts, ctx, env)
    }

    fn first_from(&self, start: usize) -> Option<Position> {
        (start..self.pointcuts.len())
            .find(|&p| !self.pointcuts[p].is_empty())
            .map(|pointcut| Position::At { pointcut, advice: 0 })
    }

    fn advice_at(&self, pointcut: usize, advice: usize) -> Result<&AdviceRef> {
        self.pointcuts.get(pointcut).and_then(|p| p.advices.get(advice)).ok_or_else(|| {
            Error::internal(&self.join_point, format!("no advice at pointcut {pointcut}, index {advice}"))
        })
    }

    /// Move the cursor one step. `gate` is consulted only when leaving
    /// [`ChainState::NotStarted`].
    pub fn advance(&mut self, gate: impl FnOnce(&[Pointcut]) -> Result<bool>) -> Result<Step> {
        let next = match self.position {
            Position::Start => {
                if self.pointcuts.is_empty() || !gate(&self.pointcuts)? {
                    Position::Original
                } else {
                    self.first_from(0).unwrap_or(Position::Original)
                }
            }
            Position::At { pointcut, advice } => {
                let current = self.pointcuts.get(pointcut).ok_or_else(|| {
                    Error::internal(&self.join_point, format!("cursor at missing pointcut {pointcut}"))
                })?;
                if advice + 1 < current.advices.len() {
                    Position::At { pointcut, advice: advice + 1 }
                } else {
                    self.first_from(pointcut + 1).unwrap_or(Position::Original)
                }
            }
            Position::Original => {
                return Err(Error::internal(&self.join_point, "proceed past the original join point"));
            }
        };

        let step = match next {
            Position::At { pointcut, advice } => Step::Advice(self.advice_at(pointcut, advice)?.clone()),
            _ => Step::Original,
        };
        self.state = match (self.position, next) {
            (Position::At { pointcut: from, .. }, Position::At { pointcut: to, .. }) if from != to => {
                ChainState::PointcutSwitch { from, to }
            }
            (_, Position::At { pointcut, advice }) => ChainState::AdviceActive { pointcut, advice },
            _ => ChainState::OriginalInvoked,
        };
        self.history.push(self.position);
        self.position = next;
        Ok(step)
    }

    /// Undo the last [`advance`](Self::advance).
    pub fn retreat(&mut self) -> Result<()> {
        let previous = self
            .history
            .pop()
            .ok_or_else(|| Error::internal(&self.join_point, "cursor restored more often than advanced"))?;
        self.position = previous;
        self.state = match previous {
            Position::Start => ChainState::Returned,
            Position::At { pointcut, advice } => ChainState::AdviceActive { pointcut, advice },
            Position::Original => ChainState::OriginalInvoked,
        };
        Ok(())
    }
}

pub(crate) fn cflow_gate(pointcuts: &[Pointcut], ctx: &ExpressionContext, env: &MatchEnv<'_>) -> Result<bool> {
    let mut gated = pointcuts.iter().filter(|p| p.cflow).peekable();
    if gated.peek().is_none() {
        return Ok(true);
    }
    for pointcut in gated {
        if pointcut.expression.matches(ctx, env)? {
            return Ok(true);
        }
    }
    Ok(false)
}
