//! Per-vessel action rules layered on top of the general regulation.
//!
//! Rules both veto proposed actions and observe executed ones, so a
//! counting rule sees every action it needs to tally without the caller
//! wiring anything extra.

use crate::Day;
use crate::actions::{Action, ActionKind};
use crate::regulation::Regulation;

/// What a rule may consult when judging an action.
pub struct RuleContext<'a> {
    /// The acting vessel's general regulation tree.
    pub general: &'a Regulation,
    /// How many devices the vessel currently has in the water.
    pub deployed_fads: usize,
    /// Calendar length used to resolve days of the year.
    pub days_per_year: u32,
}

/// One action-specific rule.
///
/// `is_forbidden` judges a proposal; `observe` is told about every action
/// the vessel actually performed, in execution order.
pub trait ActionRule: Send {
    fn is_forbidden(&self, action: &Action, ctx: &RuleContext<'_>) -> bool;

    fn observe(&mut self, action: &Action) {
        let _ = action;
    }

    /// Remaining yearly allowance for `kind`, if this rule counts it.
    fn remaining(&self, kind: ActionKind) -> Option<u64> {
        let _ = kind;
        None
    }

    fn reset_yearly(&mut self) {}
}

/// Ordered collection of rules evaluated as one.
///
/// A single forbidding rule vetoes the action; observations are broadcast
/// to every rule in registration order.
#[derive(Default)]
pub struct ActionRuleSet {
    rules: Vec<Box<dyn ActionRule>>,
}

impl ActionRuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Box<dyn ActionRule>) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn is_forbidden(&self, action: &Action, ctx: &RuleContext<'_>) -> bool {
        self.rules.iter().any(|rule| rule.is_forbidden(action, ctx))
    }

    pub fn observe(&mut self, action: &Action) {
        for rule in &mut self.rules {
            rule.observe(action);
        }
    }

    /// Minimum remaining yearly allowance for `kind` across counting rules,
    /// `None` when no rule counts it.
    #[must_use]
    pub fn remaining(&self, kind: ActionKind) -> Option<u64> {
        self.rules.iter().filter_map(|rule| rule.remaining(kind)).min()
    }

    pub fn reset_yearly(&mut self) {
        for rule in &mut self.rules {
            rule.reset_yearly();
        }
    }

    /// Whether some counted action kind still has yearly allowance left.
    /// Only kinds a rule counts weigh in; with no counting rules at all
    /// the year never closes.
    #[must_use]
    pub fn has_yearly_limited_action_remaining(&self) -> bool {
        let mut any_counted = false;
        for kind in ActionKind::ALL {
            match self.remaining(kind) {
                Some(left) if left > 0 => return true,
                Some(_) => any_counted = true,
                None => {}
            }
        }
        !any_counted
    }
}

impl std::fmt::Debug for ActionRuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRuleSet")
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Caps how often a group of action kinds may be performed per year.
#[derive(Debug, Clone)]
pub struct SetLimitRule {
    kinds: Vec<ActionKind>,
    limit: u64,
    used: u64,
}

impl SetLimitRule {
    #[must_use]
    pub fn new(kinds: Vec<ActionKind>, limit: u64) -> Self {
        Self {
            kinds,
            limit,
            used: 0,
        }
    }

    fn applies_to(&self, kind: ActionKind) -> bool {
        self.kinds.contains(&kind)
    }
}

impl ActionRule for SetLimitRule {
    fn is_forbidden(&self, action: &Action, _ctx: &RuleContext<'_>) -> bool {
        self.applies_to(action.kind) && self.used >= self.limit
    }

    fn observe(&mut self, action: &Action) {
        if self.applies_to(action.kind) {
            self.used = self.used.saturating_add(1);
        }
    }

    fn remaining(&self, kind: ActionKind) -> Option<u64> {
        self.applies_to(kind).then(|| self.limit.saturating_sub(self.used))
    }

    fn reset_yearly(&mut self) {
        self.used = 0;
    }
}

/// Caps how many devices a vessel may have in the water at once.
#[derive(Debug, Clone, Copy)]
pub struct ActiveFadLimitRule {
    limit: usize,
}

impl ActiveFadLimitRule {
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl ActionRule for ActiveFadLimitRule {
    fn is_forbidden(&self, action: &Action, ctx: &RuleContext<'_>) -> bool {
        action.kind == ActionKind::Deploy && ctx.deployed_fads >= self.limit
    }
}

/// Forbids deployments in the run-up to a blanket closure, so devices are
/// not dropped right before their owner must stop fishing.
#[derive(Debug, Clone, Copy)]
pub struct ClosureBufferRule {
    buffer_days: u64,
}

impl ClosureBufferRule {
    #[must_use]
    pub const fn new(buffer_days: u64) -> Self {
        Self { buffer_days }
    }
}

impl ActionRule for ClosureBufferRule {
    fn is_forbidden(&self, action: &Action, ctx: &RuleContext<'_>) -> bool {
        if action.kind != ActionKind::Deploy {
            return false;
        }
        let ahead = Day(action.day.0 + self.buffer_days);
        ctx.general.no_fishing_at(ahead.of_year(ctx.days_per_year))
    }
}
