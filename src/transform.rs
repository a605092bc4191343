//! The fixpoint scheduler: repeated match-and-rewrite to normal form.
//!
//! One step scans the rule set in priority order and fires the first rule
//! with a match; the loop repeats until no rule matches anywhere (normal
//! form) or a caller-supplied step budget runs out. The budget path is a
//! reported, recoverable outcome, not an error: non-terminating rule sets
//! are legitimate inputs and the caller gets the net back as far as it got.
//!
//! Determinism: rule priority is a total order, candidate enumeration is
//! agent-creation order, and extension from a candidate is forced, so for a
//! fixed rule set the reduction sequence from a given net is a function of
//! the net's structure and insertion history alone.
//!
//! # Citations
//! - Lafont, "Interaction nets", POPL (1990), §3
//! - Abstract reduction systems: Baader & Nipkow, "Term rewriting and all
//!   that" (1998), ch. 2

use crate::core::Net;
use crate::fingerprint::net_fingerprint;
use crate::matcher::find_match;
use crate::rewrite::{apply, RewriteOpError};
use crate::ruleset::{RuleId, RuleSet};
use crate::trace::{RewriteTrace, TraceStep};
use serde::{Deserialize, Serialize};

/// Outcome of a single scheduler step. Carries the net either way; a
/// consumed net must always ride somewhere.
#[derive(Debug)]
pub enum StepResult {
    /// A rule fired; here is the successor net.
    Reduced {
        /// The net after the rewrite.
        net: Net,
        /// The rule that fired.
        rule: RuleId,
    },
    /// No rule matches anywhere; the net is in normal form.
    NormalForm(Net),
}

/// Why a `transform` run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// No rule matched; the final net is a normal form.
    ReachedNormalForm,
    /// The step budget ran out first; the final net is as far as the run
    /// got, not a normal form.
    StepLimitExceeded,
}

/// Result of a `transform` run: the final net, why the run stopped, and
/// how many rewrite steps it took.
#[derive(Debug)]
pub struct Normalization {
    /// The final net.
    pub net: Net,
    /// Why the run stopped.
    pub reason: TerminationReason,
    /// Number of rewrite steps performed.
    pub steps: usize,
}

/// Performs one scheduler step: fires the first matching rule in priority
/// order, or reports normal form.
///
/// The only error path is a failed application of a just-found match of a
/// validated rule, which indicates a defect in the engine rather than in
/// the inputs; it is propagated, with the net riding in the error.
pub fn step(rules: &RuleSet, net: Net) -> Result<StepResult, RewriteOpError> {
    for (id, rule) in rules.rules_by_priority() {
        if let Some(found) = find_match(rule.pattern(), &net) {
            let next = apply(net, rule.pattern(), rule.replacement(), &found)?;
            tracing::debug!(rule = rule.name(), agents = next.agent_count(), "step");
            return Ok(StepResult::Reduced { net: next, rule: id });
        }
    }
    Ok(StepResult::NormalForm(net))
}

/// True when any rule in the set still matches somewhere in the net.
fn has_redex(rules: &RuleSet, net: &Net) -> bool {
    rules
        .rules_by_priority()
        .any(|(_, rule)| find_match(rule.pattern(), net).is_some())
}

/// Reduces a net to normal form, or until `step_limit` steps have elapsed.
///
/// The budget is a hard cap: at most `step_limit` rewrites are performed.
/// Once it is spent the net is only probed for a remaining match, so a run
/// that converges on exactly its last budgeted step still reports
/// `ReachedNormalForm`, while a leftover redex reports `StepLimitExceeded`
/// with the net exactly as the final counted step left it.
pub fn transform(
    rules: &RuleSet,
    net: Net,
    step_limit: usize,
) -> Result<Normalization, RewriteOpError> {
    let mut net = net;
    let mut steps = 0;
    while steps < step_limit {
        match step(rules, net)? {
            StepResult::NormalForm(done) => {
                return Ok(Normalization {
                    net: done,
                    reason: TerminationReason::ReachedNormalForm,
                    steps,
                });
            }
            StepResult::Reduced { net: next, .. } => {
                net = next;
                steps += 1;
            }
        }
    }
    if has_redex(rules, &net) {
        tracing::warn!(steps, "step limit reached before normal form");
        return Ok(Normalization {
            net,
            reason: TerminationReason::StepLimitExceeded,
            steps,
        });
    }
    Ok(Normalization {
        net,
        reason: TerminationReason::ReachedNormalForm,
        steps,
    })
}

/// Like [`transform`], but records a fingerprinted step per rewrite, so a
/// run can be audited or replayed against an independent reducer.
pub fn transform_traced(
    rules: &RuleSet,
    net: Net,
    step_limit: usize,
) -> Result<(Normalization, RewriteTrace), RewriteOpError> {
    let mut net = net;
    let mut trace = RewriteTrace::new();
    let mut steps = 0;
    while steps < step_limit {
        let pre = net_fingerprint(&net);
        match step(rules, net)? {
            StepResult::NormalForm(done) => {
                return Ok((
                    Normalization {
                        net: done,
                        reason: TerminationReason::ReachedNormalForm,
                        steps,
                    },
                    trace,
                ));
            }
            StepResult::Reduced { net: next, rule } => {
                let rule_name = rules
                    .get(rule)
                    .map(|r| r.name().to_owned())
                    .unwrap_or_default();
                trace.push(TraceStep {
                    rule,
                    rule_name,
                    pre,
                    post: net_fingerprint(&next),
                });
                net = next;
                steps += 1;
            }
        }
    }
    let reason = if has_redex(rules, &net) {
        tracing::warn!(steps, "step limit reached before normal form");
        TerminationReason::StepLimitExceeded
    } else {
        TerminationReason::ReachedNormalForm
    };
    Ok((Normalization { net, reason, steps }, trace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentId, AgentType, Port};
    use crate::pattern::{Pattern, Replacement, TemplatePort};
    use crate::ruleset::{NoIo, Rule};

    fn succ_ty() -> AgentType {
        AgentType::new("Succ", 1)
    }

    fn zero_ty() -> AgentType {
        AgentType::new("Zero", 0)
    }

    fn out_ty() -> AgentType {
        AgentType::new("Out", 0)
    }

    /// `Pop(Succ(x)) -> Pop(x)` and `Pop(Zero) -> Done`: a counter that
    /// consumes a numeral one constructor at a time.
    fn countdown_rules() -> RuleSet {
        let pop = AgentType::new("Pop", 0);
        // Pop/0 faces the numeral with its principal port.
        let mut succ_lhs = Pattern::new();
        let s = succ_lhs.add_node(succ_ty());
        let p = succ_lhs.add_node(pop.clone());
        succ_lhs.set_root(s);
        succ_lhs.add_wire(TemplatePort::principal(s), TemplatePort::principal(p));
        succ_lhs.add_boundary(TemplatePort::aux(s, 1));
        let mut succ_rhs = Replacement::new(1);
        let p2 = succ_rhs.add_node(pop.clone());
        succ_rhs.bind_port(0, TemplatePort::principal(p2)).unwrap();

        let mut zero_lhs = Pattern::new();
        let z = zero_lhs.add_node(zero_ty());
        let p = zero_lhs.add_node(pop);
        zero_lhs.set_root(z);
        zero_lhs.add_wire(TemplatePort::principal(z), TemplatePort::principal(p));
        let mut zero_rhs = Replacement::new(0);
        let d = zero_rhs.add_node(AgentType::new("Done", 0));
        let d2 = zero_rhs.add_node(AgentType::new("Done", 0));
        zero_rhs.add_wire(TemplatePort::principal(d), TemplatePort::principal(d2));

        RuleSet::new(
            vec![
                Rule::new("pop-succ", succ_lhs, succ_rhs).unwrap(),
                Rule::new("pop-zero", zero_lhs, zero_rhs).unwrap(),
            ],
            &NoIo,
        )
        .unwrap()
    }

    /// `Pop - Succ^n - Zero`.
    fn countdown_net(n: usize) -> Net {
        let (mut net, p) = Net::new().add_agent(AgentType::new("Pop", 0));
        let mut open = Port::principal(p);
        for _ in 0..n {
            let (next, s) = net.add_agent(succ_ty());
            net = next.connect(open, Port::principal(s)).unwrap();
            open = Port::aux(s, 1);
        }
        let (net, z) = net.add_agent(zero_ty());
        net.connect(open, Port::principal(z)).unwrap()
    }

    #[test]
    fn countdown_reaches_normal_form() {
        let rules = countdown_rules();
        let outcome = transform(&rules, countdown_net(4), 100).unwrap();
        assert_eq!(outcome.reason, TerminationReason::ReachedNormalForm);
        assert_eq!(outcome.steps, 5);
        assert_eq!(outcome.net.agent_count(), 2);
        assert!(outcome.net.is_well_formed());
    }

    #[test]
    fn step_reports_normal_form_without_consuming_structure() {
        let rules = countdown_rules();
        // Out - Zero has no Pop, so nothing matches.
        let (net, o) = Net::new().add_agent(out_ty());
        let (net, z) = net.add_agent(zero_ty());
        let net = net.connect(Port::principal(o), Port::principal(z)).unwrap();
        match step(&rules, net).unwrap() {
            StepResult::NormalForm(net) => {
                assert_eq!(net.agent_count(), 2);
                assert!(net.contains_agent(o));
            }
            StepResult::Reduced { .. } => panic!("nothing should match"),
        }
    }

    #[test]
    fn step_limit_is_reported_not_fatal() {
        let rules = countdown_rules();
        let outcome = transform(&rules, countdown_net(10), 3).unwrap();
        assert_eq!(outcome.reason, TerminationReason::StepLimitExceeded);
        assert_eq!(outcome.steps, 3);
        assert!(outcome.net.is_well_formed());
        // Resuming from where it stopped still converges; 11 steps total.
        let resumed = transform(&rules, outcome.net, 100).unwrap();
        assert_eq!(resumed.reason, TerminationReason::ReachedNormalForm);
        assert_eq!(resumed.steps, 8);
    }

    #[test]
    fn budget_caps_the_number_of_rewrites() {
        let rules = countdown_rules();
        let outcome = transform(&rules, countdown_net(10), 3).unwrap();
        assert_eq!(outcome.steps, 3);
        // The returned net is the three-step reduct, not one step past it.
        let mut expected = countdown_net(10);
        for _ in 0..3 {
            expected = match step(&rules, expected).unwrap() {
                StepResult::Reduced { net, .. } => net,
                StepResult::NormalForm(_) => panic!("countdown still has redexes"),
            };
        }
        assert_eq!(net_fingerprint(&outcome.net), net_fingerprint(&expected));
    }

    #[test]
    fn exact_budget_still_converges() {
        let rules = countdown_rules();
        // n = 2 needs exactly 3 steps; a budget of 3 must report normal form.
        let outcome = transform(&rules, countdown_net(2), 3).unwrap();
        assert_eq!(outcome.reason, TerminationReason::ReachedNormalForm);
        assert_eq!(outcome.steps, 3);
    }

    #[test]
    fn normal_form_is_a_fixpoint() {
        let rules = countdown_rules();
        let outcome = transform(&rules, countdown_net(3), 100).unwrap();
        let again = transform(&rules, outcome.net, 100).unwrap();
        assert_eq!(again.reason, TerminationReason::ReachedNormalForm);
        assert_eq!(again.steps, 0);
    }

    #[test]
    fn priority_order_breaks_ties() {
        // Two rules erase the same A-B pair into different witnesses; the
        // first registered wins, and after an override the other does.
        let a_ty = AgentType::new("A", 0);
        let b_ty = AgentType::new("B", 0);
        let make = |witness: &str| {
            let mut lhs = Pattern::new();
            let a = lhs.add_node(a_ty.clone());
            let b = lhs.add_node(b_ty.clone());
            lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(b));
            let mut rhs = Replacement::new(0);
            let w = rhs.add_node(AgentType::new(witness, 0));
            let w2 = rhs.add_node(AgentType::new(witness, 0));
            rhs.add_wire(TemplatePort::principal(w), TemplatePort::principal(w2));
            Rule::new(format!("ab-{witness}"), lhs, rhs).unwrap()
        };
        let rules = RuleSet::new(vec![make("First"), make("Second")], &NoIo).unwrap();
        let ids: Vec<_> = rules.rules_by_priority().map(|(id, _)| id).collect();

        let build = || {
            let (net, a) = Net::new().add_agent(a_ty.clone());
            let (net, b) = net.add_agent(b_ty.clone());
            net.connect(Port::principal(a), Port::principal(b)).unwrap()
        };
        let outcome = transform(&rules, build(), 10).unwrap();
        let witness = outcome.net.agent(AgentId::new(2)).unwrap();
        assert_eq!(witness.ty.name(), "First");

        let rules = rules.override_rule(ids[1], ids[0]).unwrap();
        let outcome = transform(&rules, build(), 10).unwrap();
        let witness = outcome.net.agent(AgentId::new(2)).unwrap();
        assert_eq!(witness.ty.name(), "Second");
    }

    #[test]
    fn traced_run_chains_fingerprints() {
        let rules = countdown_rules();
        let (outcome, trace) = transform_traced(&rules, countdown_net(3), 100).unwrap();
        assert_eq!(outcome.reason, TerminationReason::ReachedNormalForm);
        assert_eq!(trace.len(), outcome.steps);
        assert!(trace.verify_chain());
        assert_eq!(trace.steps()[0].rule_name, "pop-succ");
        assert_eq!(trace.steps().last().unwrap().rule_name, "pop-zero");
    }
}
