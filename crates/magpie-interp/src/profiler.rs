//! Per-decision prediction statistics.
//!
//! Collected only when profiling is enabled on the parser; the decision
//! path itself is identical either way, so profiled and unprofiled parses
//! of the same input produce the same trees and diagnostics.

use serde::{Deserialize, Serialize};

use crate::token::TextSpan;

/// One recorded lookahead excursion, in raw token-buffer indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookEvent {
    pub decision: u16,
    /// Symbols consulted, 1-based.
    pub depth: u64,
    pub start_index: usize,
    pub stop_index: usize,
    pub full_context: bool,
}

/// Statistics for one decision, aggregated over a single parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInfo {
    pub decision: u16,
    pub invocations: u64,
    /// Wall time spent predicting this decision.
    pub time_ns: u64,
    pub sll_total_look: u64,
    pub sll_min_look: u64,
    pub sll_max_look: u64,
    pub sll_max_look_event: Option<LookEvent>,
    pub ll_total_look: u64,
    pub ll_min_look: u64,
    pub ll_max_look: u64,
    pub ll_max_look_event: Option<LookEvent>,
    /// Memoized-edge steps taken during the fast phase.
    pub sll_dfa_transitions: u64,
    /// Edges that had to be computed from the automaton.
    pub sll_atn_transitions: u64,
    pub ll_atn_transitions: u64,
    /// Times the fast phase conflicted and full context was consulted.
    pub ll_fallbacks: u64,
    pub context_sensitivities: u64,
    pub ambiguities: u64,
    pub predicate_evals: u64,
    /// Predictions that found no viable alternative.
    pub errors: u64,
    pub dfa_size: usize,
}

/// Where a decision first fired: its rule and the span of the token the
/// parser was looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSite {
    pub rule: u16,
    pub rule_name: String,
    pub span: TextSpan,
}

/// Snapshot of a profiled parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseInfo {
    pub decisions: Vec<DecisionInfo>,
    /// First-invocation site per decision, aligned with `decisions`.
    pub sites: Vec<Option<DecisionSite>>,
    pub parse_time_ns: u64,
    /// Default-channel tokens in the parsed buffer, EOF excluded.
    pub input_tokens: usize,
}

impl ParseInfo {
    pub fn decision(&self, decision: u16) -> &DecisionInfo {
        &self.decisions[decision as usize]
    }

    pub fn total_prediction_time_ns(&self) -> u64 {
        self.decisions.iter().map(|d| d.time_ns).sum()
    }

    pub fn prediction_time_percent(&self) -> f64 {
        if self.parse_time_ns == 0 {
            return 0.0;
        }
        self.total_prediction_time_ns() as f64 * 100.0 / self.parse_time_ns as f64
    }

    pub fn total_look(&self) -> u64 {
        self.decisions.iter().map(|d| d.sll_total_look + d.ll_total_look).sum()
    }

    /// Lookahead symbols consulted per input token.
    pub fn lookahead_burden(&self) -> f64 {
        if self.input_tokens == 0 {
            return 0.0;
        }
        self.total_look() as f64 / self.input_tokens as f64
    }

    /// Share of fast-phase steps that missed the memo table.
    pub fn dfa_cache_miss_rate(&self) -> f64 {
        let miss: u64 = self.decisions.iter().map(|d| d.sll_atn_transitions).sum();
        let total: u64 = miss + self.decisions.iter().map(|d| d.sll_dfa_transitions).sum::<u64>();
        if total == 0 {
            return 0.0;
        }
        miss as f64 / total as f64
    }

    pub fn total_dfa_size(&self) -> usize {
        self.decisions.iter().map(|d| d.dfa_size).sum()
    }

    pub fn total_ll_fallbacks(&self) -> u64 {
        self.decisions.iter().map(|d| d.ll_fallbacks).sum()
    }
}

/// Mutable collector the parser feeds during a profiled run.
#[derive(Debug)]
pub(crate) struct ProfileCollector {
    decisions: Vec<DecisionInfo>,
    sites: Vec<Option<DecisionSite>>,
}

impl ProfileCollector {
    pub fn new(decision_count: usize) -> ProfileCollector {
        let mut decisions = Vec::with_capacity(decision_count);
        for d in 0..decision_count {
            decisions.push(DecisionInfo { decision: d as u16, ..DecisionInfo::default() });
        }
        ProfileCollector { decisions, sites: vec![None; decision_count] }
    }

    pub fn site(&mut self, decision: u16, site: DecisionSite) {
        let slot = &mut self.sites[decision as usize];
        if slot.is_none() {
            *slot = Some(site);
        }
    }

    pub fn decision_mut(&mut self, decision: u16) -> &mut DecisionInfo {
        &mut self.decisions[decision as usize]
    }

    pub fn record_look(&mut self, event: LookEvent) {
        let info = &mut self.decisions[event.decision as usize];
        let (total, min, max, slot) = if event.full_context {
            (
                &mut info.ll_total_look,
                &mut info.ll_min_look,
                &mut info.ll_max_look,
                &mut info.ll_max_look_event,
            )
        } else {
            (
                &mut info.sll_total_look,
                &mut info.sll_min_look,
                &mut info.sll_max_look,
                &mut info.sll_max_look_event,
            )
        };
        *total += event.depth;
        if *min == 0 || event.depth < *min {
            *min = event.depth;
        }
        if event.depth > *max {
            *max = event.depth;
            *slot = Some(event);
        }
    }

    pub fn finish(self, parse_time_ns: u64, input_tokens: usize) -> ParseInfo {
        ParseInfo { decisions: self.decisions, sites: self.sites, parse_time_ns, input_tokens }
    }
}
