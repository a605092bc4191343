//! Rule construction and rule-set management.
//!
//! A `Rule` pairs a validated pattern with a boundary-aligned replacement.
//! A `RuleSet` is an ordered collection of rules: order is priority, and the
//! scheduler always fires the first rule (in priority order) that matches.
//! Rules over I/O agent types live in a separate, higher-priority band and
//! must be registered through [`RuleSet::add_io_rule`]; the general
//! constructor rejects them.
//!
//! The analysis half of this module enumerates critical pairs by
//! superposing two patterns over a shared agent set, closes each overlap
//! into a runnable net, and tests local confluence by reducing the overlap
//! along both orders and comparing results up to isomorphism. Local
//! confluence of every critical pair lifts to global confluence for
//! terminating rule sets.
//!
//! # Citations
//! - Critical pairs: Knuth & Bendix, "Simple word problems in universal
//!   algebras" (1970)
//! - Newman's lemma: Newman, "On theories with a combinatorial definition
//!   of equivalence" (1942)
//! - Interaction-rule confluence: Lafont, "Interaction nets", POPL (1990), §3

use crate::core::{AgentId, AgentType, Net, Port};
use crate::matcher::find_match;
use crate::pattern::{
    BoundarySpot, Pattern, Replacement, TemplateError, TemplateNodeId, TemplatePort,
};
use crate::rewrite::apply;
use crate::transform::{transform, TerminationReason};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// Reserved type symbol for agents that cap open ports of an overlap net.
const CAP_SYMBOL: &str = "__cap";
/// Reserved type symbol for agents standing in for replacement boundary
/// slots during rule composition.
const SLOT_SYMBOL: &str = "__slot";

/// Reduction budget for one arm of a commutation test. A critical pair that
/// cannot settle within this many steps is reported as non-commuting rather
/// than looping the analysis.
const COMMUTE_STEP_LIMIT: usize = 512;

/// Identifier for a rule within a rule set.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u64);

impl RuleId {
    /// Creates a `RuleId` from a raw `u64`.
    ///
    /// Prefer ids assigned by a [`RuleSet`]; raw construction is for tests
    /// and deserialization.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw `u64` representation.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleId({})", self.0)
    }
}

/// Error type for rule and rule-set construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The pattern failed template validation.
    Pattern(TemplateError),
    /// The replacement failed template validation.
    Replacement(TemplateError),
    /// Pattern and replacement declare different boundary lengths.
    BoundaryArityMismatch {
        /// Slots declared by the pattern.
        pattern: usize,
        /// Slots declared by the replacement.
        replacement: usize,
    },
    /// Boundary labels disagree at this slot.
    BoundarySignatureMismatch(usize),
    /// A general rule mentions an I/O agent type; register it through
    /// [`RuleSet::add_io_rule`] instead.
    IoRuleRequired {
        /// Name of the offending rule.
        rule: String,
        /// The I/O type it mentions.
        agent_type: String,
    },
    /// The rule id is not in this rule set.
    UnknownRule(RuleId),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::Pattern(err) => write!(f, "invalid pattern: {err}"),
            RuleError::Replacement(err) => write!(f, "invalid replacement: {err}"),
            RuleError::BoundaryArityMismatch {
                pattern,
                replacement,
            } => write!(
                f,
                "boundary arity mismatch: pattern has {pattern} slots, replacement {replacement}"
            ),
            RuleError::BoundarySignatureMismatch(slot) => {
                write!(f, "boundary labels disagree at slot {slot}")
            }
            RuleError::IoRuleRequired { rule, agent_type } => {
                write!(f, "rule {rule:?} mentions I/O type {agent_type:?}; use add_io_rule")
            }
            RuleError::UnknownRule(id) => write!(f, "unknown rule {id}"),
        }
    }
}

impl std::error::Error for RuleError {}

/// A rewrite rule: a pattern, its boundary-aligned replacement, and a name
/// for diagnostics and traces.
///
/// Construction validates both templates and their alignment, so a `Rule`
/// in hand is always applicable to any match of its pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    name: String,
    pattern: Pattern,
    replacement: Replacement,
}

impl Rule {
    /// Builds a rule, validating the pattern (connected, fully covered,
    /// rooted), the replacement (all slots bound, fully covered), and the
    /// boundary signature shared between them (length and labels).
    pub fn new(
        name: impl Into<String>,
        pattern: Pattern,
        replacement: Replacement,
    ) -> Result<Self, RuleError> {
        pattern.validate().map_err(RuleError::Pattern)?;
        replacement.validate().map_err(RuleError::Replacement)?;
        if pattern.boundary().len() != replacement.boundary().len() {
            return Err(RuleError::BoundaryArityMismatch {
                pattern: pattern.boundary().len(),
                replacement: replacement.boundary().len(),
            });
        }
        for (slot, (a, b)) in pattern
            .labels()
            .iter()
            .zip(replacement.labels())
            .enumerate()
        {
            if a != b {
                return Err(RuleError::BoundarySignatureMismatch(slot));
            }
        }
        Ok(Self {
            name: name.into(),
            pattern,
            replacement,
        })
    }

    /// Rule name, for diagnostics.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The left-hand-side pattern.
    #[inline]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The right-hand-side replacement.
    #[inline]
    pub fn replacement(&self) -> &Replacement {
        &self.replacement
    }

    /// The first agent type this rule mentions that the policy classifies
    /// as I/O, pattern side scanned before the replacement. `None` for a
    /// pure rule.
    pub fn io_type(&self, io: &dyn IoPolicy) -> Option<&AgentType> {
        self.pattern
            .nodes()
            .chain(self.replacement.nodes())
            .map(|(_, ty)| ty)
            .find(|ty| io.is_io_agent(ty))
    }
}

/// Classifies agent types as I/O or pure.
///
/// The core never performs I/O itself; it only recognizes I/O agent types
/// through this predicate, supplied by the embedding program, and keeps
/// their rules in a separate priority band.
pub trait IoPolicy {
    /// True when this agent type is reserved for I/O.
    fn is_io_agent(&self, ty: &AgentType) -> bool;
}

/// The policy of a closed system: no type is I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIo;

impl IoPolicy for NoIo {
    #[inline]
    fn is_io_agent(&self, _ty: &AgentType) -> bool {
        false
    }
}

/// An ordered collection of rules. Order is priority.
///
/// Two bands: I/O rules first, then general rules, each in registration
/// order. The scheduler fires the first matching rule across the combined
/// order, so earlier rules win every conflict unless
/// [`RuleSet::override_rule`] reorders them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    io_rules: Vec<(RuleId, Rule)>,
    rules: Vec<(RuleId, Rule)>,
    next_id: u64,
}

impl RuleSet {
    /// Builds a rule set from general rules, priorities assigned by input
    /// order. Any rule mentioning an I/O type under `io` is rejected with
    /// [`RuleError::IoRuleRequired`].
    pub fn new(rules: Vec<Rule>, io: &dyn IoPolicy) -> Result<Self, RuleError> {
        let mut set = Self::default();
        for rule in rules {
            if let Some(ty) = rule.io_type(io) {
                return Err(RuleError::IoRuleRequired {
                    rule: rule.name().to_owned(),
                    agent_type: ty.name().to_owned(),
                });
            }
            let id = set.fresh_id();
            set.rules.push((id, rule));
        }
        Ok(set)
    }

    /// Registers an I/O rule in the high-priority band.
    pub fn add_io_rule(mut self, rule: Rule) -> (Self, RuleId) {
        let id = self.fresh_id();
        self.io_rules.push((id, rule));
        (self, id)
    }

    fn fresh_id(&mut self) -> RuleId {
        let id = RuleId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Total number of rules across both bands.
    #[inline]
    pub fn len(&self) -> usize {
        self.io_rules.len() + self.rules.len()
    }

    /// True when the set holds no rules.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.io_rules.is_empty() && self.rules.is_empty()
    }

    /// Looks up a rule by id.
    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules_by_priority()
            .find(|(rid, _)| *rid == id)
            .map(|(_, rule)| rule)
    }

    /// Iterates rules in firing order: the I/O band, then the general band.
    pub fn rules_by_priority(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.io_rules
            .iter()
            .chain(self.rules.iter())
            .map(|(id, rule)| (*id, rule))
    }

    /// Compares two rules' firing order: `Less` means `a` fires first.
    pub fn prioritize(&self, a: RuleId, b: RuleId) -> Result<Ordering, RuleError> {
        let pos = |id: RuleId| {
            self.rules_by_priority()
                .position(|(rid, _)| rid == id)
                .ok_or(RuleError::UnknownRule(id))
        };
        Ok(pos(a)?.cmp(&pos(b)?))
    }

    /// Reorders the general band so `winner` fires before `loser`.
    ///
    /// No-op when `winner` already outranks `loser`, and when either rule
    /// sits in the I/O band (that band outranks the general one and keeps
    /// registration order).
    pub fn override_rule(mut self, winner: RuleId, loser: RuleId) -> Result<Self, RuleError> {
        for id in [winner, loser] {
            if self.get(id).is_none() {
                return Err(RuleError::UnknownRule(id));
            }
        }
        let find = |band: &[(RuleId, Rule)], id: RuleId| band.iter().position(|(rid, _)| *rid == id);
        let (Some(w), Some(l)) = (find(&self.rules, winner), find(&self.rules, loser)) else {
            return Ok(self);
        };
        if w > l {
            let moved = self.rules.remove(w);
            self.rules.insert(l, moved);
        }
        Ok(self)
    }

    /// Enumerates rule pairs whose patterns can overlap on a shared agent
    /// set in some net; the pairs that can race for a redex.
    pub fn conflict_check(&self) -> BTreeSet<(RuleId, RuleId)> {
        self.find_critical_pairs()
            .into_iter()
            .map(|pair| (pair.left, pair.right))
            .collect()
    }

    /// Enumerates critical pairs, self-pairs included.
    ///
    /// For each pair of rules, patterns are superposed over every common
    /// agent set a shared net could present: gluing is seeded at every pair
    /// of same-typed nodes and then propagated along wires (each port has
    /// one wire, so propagation is forced). The identity self-overlap is
    /// skipped; matching a pattern against itself the same way twice is not
    /// a conflict. Each surviving overlap is closed with cap agents so the
    /// pair carries a runnable, well-formed net.
    pub fn find_critical_pairs(&self) -> Vec<CriticalPair> {
        let all: Vec<(RuleId, &Rule)> = self.rules_by_priority().collect();
        let mut pairs = Vec::new();
        for (i, (left_id, left)) in all.iter().enumerate() {
            for (right_id, right) in &all[i..] {
                let self_pair = *left_id == *right_id;
                for gluing in superpositions(left.pattern(), right.pattern(), self_pair) {
                    if let Some(overlap) = build_overlap(left.pattern(), right.pattern(), &gluing) {
                        pairs.push(CriticalPair {
                            left: *left_id,
                            right: *right_id,
                            overlap,
                        });
                    }
                }
            }
        }
        pairs
    }

    /// Local-confluence test for one critical pair.
    ///
    /// Reduces the overlap net twice: once firing the left rule first, once
    /// the right, then drives both to normal form with the pair's two rules
    /// and compares the results up to isomorphism. Returns false when
    /// either arm exhausts its step budget; an undecided pair must not pass
    /// as confluent.
    pub fn commute(&self, pair: &CriticalPair) -> bool {
        let (Some(a), Some(b)) = (
            self.reduce_one_order(pair, pair.left, pair.right),
            self.reduce_one_order(pair, pair.right, pair.left),
        ) else {
            return false;
        };
        crate::fingerprint::isomorphic(&a, &b)
    }

    fn reduce_one_order(&self, pair: &CriticalPair, first: RuleId, second: RuleId) -> Option<Net> {
        let first_rule = self.get(first)?;
        let second_rule = self.get(second)?;
        let mut net = pair.overlap.clone();
        if let Some(found) = find_match(first_rule.pattern(), &net) {
            net = apply(net, first_rule.pattern(), first_rule.replacement(), &found).ok()?;
        }
        let arm = RuleSet::new(vec![first_rule.clone(), second_rule.clone()], &NoIo).ok()?;
        let outcome = transform(&arm, net, COMMUTE_STEP_LIMIT).ok()?;
        match outcome.reason {
            TerminationReason::ReachedNormalForm => Some(outcome.net),
            TerminationReason::StepLimitExceeded => None,
        }
    }

    /// True when every critical pair commutes. Together with termination
    /// this gives global confluence (Newman's lemma).
    pub fn confluence_check(&self) -> bool {
        self.find_critical_pairs()
            .iter()
            .all(|pair| self.commute(pair))
    }
}

/// Two rules racing for a shared region, plus the minimal closed net
/// presenting that region.
#[derive(Debug, Clone)]
pub struct CriticalPair {
    /// First rule of the pair.
    pub left: RuleId,
    /// Second rule (equal to `left` for self-overlaps).
    pub right: RuleId,
    /// Minimal well-formed net both patterns match, open ports capped.
    pub overlap: Net,
}

/// Enumerates all gluings of two patterns: injective partial maps from the
/// left pattern's nodes onto the right's, closed under wire propagation.
fn superpositions(
    left: &Pattern,
    right: &Pattern,
    self_pair: bool,
) -> Vec<BTreeMap<TemplateNodeId, TemplateNodeId>> {
    let left_wires = wire_map(left);
    let right_wires = wire_map(right);
    let mut seen: BTreeSet<Vec<(TemplateNodeId, TemplateNodeId)>> = BTreeSet::new();
    let mut out = Vec::new();

    for (seed_l, ty_l) in left.nodes() {
        for (seed_r, ty_r) in right.nodes() {
            if ty_l != ty_r {
                continue;
            }
            let Some(gluing) = propagate(left, right, &left_wires, &right_wires, seed_l, seed_r)
            else {
                continue;
            };
            if self_pair && gluing.iter().all(|(a, b)| a == b) {
                continue;
            }
            let mut key: Vec<(TemplateNodeId, TemplateNodeId)> =
                gluing.iter().map(|(a, b)| (*a, *b)).collect();
            if self_pair {
                // A self-gluing and its inverse describe the same overlap.
                let inverse: Vec<_> = {
                    let mut v: Vec<(TemplateNodeId, TemplateNodeId)> =
                        gluing.iter().map(|(a, b)| (*b, *a)).collect();
                    v.sort();
                    v
                };
                key = key.min(inverse);
            }
            if seen.insert(key) {
                out.push(gluing);
            }
        }
    }
    out
}

fn wire_map(pattern: &Pattern) -> HashMap<TemplatePort, TemplatePort> {
    let mut map = HashMap::new();
    for (a, b) in pattern.wires() {
        map.insert(*a, *b);
        map.insert(*b, *a);
    }
    map
}

/// Grows a gluing from one seed pair by forced wire propagation. Returns
/// `None` when the two patterns disagree on any glued port's wiring.
fn propagate(
    left: &Pattern,
    right: &Pattern,
    left_wires: &HashMap<TemplatePort, TemplatePort>,
    right_wires: &HashMap<TemplatePort, TemplatePort>,
    seed_l: TemplateNodeId,
    seed_r: TemplateNodeId,
) -> Option<BTreeMap<TemplateNodeId, TemplateNodeId>> {
    let mut map: BTreeMap<TemplateNodeId, TemplateNodeId> = BTreeMap::from([(seed_l, seed_r)]);
    let mut rev: HashMap<TemplateNodeId, TemplateNodeId> = HashMap::from([(seed_r, seed_l)]);
    let mut queue = vec![(seed_l, seed_r)];

    while let Some((x, y)) = queue.pop() {
        let arity = left.node_type(x)?.arity();
        for index in 0..=arity {
            let wl = left_wires.get(&TemplatePort::new(x, index));
            let wr = right_wires.get(&TemplatePort::new(y, index));
            // A port internal on one side and boundary on the other is
            // unconstrained; only two internal wires force anything.
            let (Some(pl), Some(pr)) = (wl, wr) else {
                continue;
            };
            if pl.index != pr.index || left.node_type(pl.node)? != right.node_type(pr.node)? {
                return None;
            }
            match (map.get(&pl.node), rev.get(&pr.node)) {
                (Some(&mapped), _) => {
                    if mapped != pr.node {
                        return None;
                    }
                }
                (None, Some(_)) => return None,
                (None, None) => {
                    map.insert(pl.node, pr.node);
                    rev.insert(pr.node, pl.node);
                    queue.push((pl.node, pr.node));
                }
            }
        }
    }
    Some(map)
}

/// Materializes a gluing as a closed net: the union of both patterns modulo
/// the gluing, every open port capped with a fresh 0-ary agent.
fn build_overlap(
    left: &Pattern,
    right: &Pattern,
    gluing: &BTreeMap<TemplateNodeId, TemplateNodeId>,
) -> Option<Net> {
    let rev: HashMap<TemplateNodeId, TemplateNodeId> =
        gluing.iter().map(|(a, b)| (*b, *a)).collect();
    let mut net = Net::new();
    let mut left_ids: HashMap<TemplateNodeId, AgentId> = HashMap::new();
    let mut right_ids: HashMap<TemplateNodeId, AgentId> = HashMap::new();

    for (node, ty) in left.nodes() {
        let (next, id) = net.add_agent(ty.clone());
        net = next;
        left_ids.insert(node, id);
    }
    for (node, ty) in right.nodes() {
        match rev.get(&node) {
            Some(shared) => {
                right_ids.insert(node, *left_ids.get(shared)?);
            }
            None => {
                let (next, id) = net.add_agent(ty.clone());
                net = next;
                right_ids.insert(node, id);
            }
        }
    }

    for (a, b) in left.wires() {
        let pa = Port::new(*left_ids.get(&a.node)?, a.index);
        let pb = Port::new(*left_ids.get(&b.node)?, b.index);
        net = net.connect(pa, pb).ok()?;
    }
    for (a, b) in right.wires() {
        let pa = Port::new(*right_ids.get(&a.node)?, a.index);
        let pb = Port::new(*right_ids.get(&b.node)?, b.index);
        match net.peer(pa) {
            // Glued wire already present from the left pattern.
            Some(existing) if existing == pb => {}
            Some(_) => return None,
            None => net = net.connect(pa, pb).ok()?,
        }
    }

    // Cap every remaining open port so the overlap is a runnable net.
    let open: Vec<Port> = net
        .agents_sorted()
        .iter()
        .flat_map(|agent| agent.ports())
        .filter(|port| net.peer(*port).is_none())
        .collect();
    for port in open {
        let (next, cap) = net.add_agent(AgentType::new(CAP_SYMBOL, 0));
        net = next.connect(port, Port::principal(cap)).ok()?;
    }
    debug_assert!(net.validate().is_ok(), "overlap net must be closed");
    Some(net)
}

/// Composes two rules into one whose single step has the effect of firing
/// `first` and then `second` inside `first`'s freshly built replacement.
///
/// `second`'s pattern must embed entirely into the agents `first`
/// instantiates; boundary slots are presented to the matcher as reserved
/// stand-in agents, so a pattern reaching past the replacement cannot
/// match and the composition correctly comes back `None`.
pub fn compose_rules(first: &Rule, second: &Rule) -> Option<Rule> {
    let (net, holes) = instantiate_with_slots(first.replacement())?;
    let found = find_match(second.pattern(), &net)?;
    let net = apply(net, second.pattern(), second.replacement(), &found).ok()?;

    let hole_ids: HashSet<AgentId> = holes.iter().flatten().copied().collect();
    let mut composed = Replacement::new(first.pattern().boundary().len());
    let mut back: HashMap<AgentId, TemplateNodeId> = HashMap::new();
    for agent in net.agents_sorted() {
        if !hole_ids.contains(&agent.id) {
            back.insert(agent.id, composed.add_node(agent.ty.clone()));
        }
    }

    let mut passthroughs: Vec<(usize, usize)> = Vec::new();
    for (i, spot) in first.replacement().boundary().iter().enumerate() {
        match holes[i] {
            Some(hole) => {
                let peer = net.peer(Port::principal(hole))?;
                if hole_ids.contains(&peer.agent) {
                    let j = holes.iter().position(|h| *h == Some(peer.agent))?;
                    if i < j {
                        passthroughs.push((i, j));
                    }
                } else {
                    let node = *back.get(&peer.agent)?;
                    composed.bind_port(i, TemplatePort::new(node, peer.index)).ok()?;
                }
            }
            // Pass-through slots have no presence in the instantiated net
            // and survive composition untouched.
            None => {
                if let BoundarySpot::Passthrough(j) = spot {
                    if i < *j {
                        passthroughs.push((i, *j));
                    }
                }
            }
        }
    }
    for (i, j) in passthroughs {
        composed.bind_passthrough(i, j).ok()?;
    }

    for (a, b) in net.wires_sorted() {
        if hole_ids.contains(&a.agent) || hole_ids.contains(&b.agent) {
            continue;
        }
        let ta = TemplatePort::new(*back.get(&a.agent)?, a.index);
        let tb = TemplatePort::new(*back.get(&b.agent)?, b.index);
        composed.add_wire(ta, tb);
    }
    for (i, label) in first.pattern().labels().iter().enumerate() {
        if let Some(label) = label {
            composed.set_label(i, label.clone()).ok()?;
        }
    }

    let name = format!("{}>{}", first.name(), second.name());
    Rule::new(name, first.pattern().clone(), composed).ok()
}

/// Instantiates a replacement as a standalone net, wiring each `Port`
/// boundary slot to a fresh stand-in agent so the net is closed. Returns
/// the net and, per slot, the stand-in's id (`None` for pass-throughs).
fn instantiate_with_slots(replacement: &Replacement) -> Option<(Net, Vec<Option<AgentId>>)> {
    let mut net = Net::new();
    let mut ids: HashMap<TemplateNodeId, AgentId> = HashMap::new();
    for (node, ty) in replacement.nodes() {
        let (next, id) = net.add_agent(ty.clone());
        net = next;
        ids.insert(node, id);
    }
    for (a, b) in replacement.wires() {
        let pa = Port::new(*ids.get(&a.node)?, a.index);
        let pb = Port::new(*ids.get(&b.node)?, b.index);
        net = net.connect(pa, pb).ok()?;
    }
    let mut holes = Vec::with_capacity(replacement.boundary().len());
    for spot in replacement.boundary() {
        match spot {
            BoundarySpot::Port(tp) => {
                let port = Port::new(*ids.get(&tp.node)?, tp.index);
                let (next, hole) = net.add_agent(AgentType::new(SLOT_SYMBOL, 0));
                net = next.connect(port, Port::principal(hole)).ok()?;
                holes.push(Some(hole));
            }
            BoundarySpot::Passthrough(_) => holes.push(None),
            BoundarySpot::Unbound => return None,
        }
    }
    Some((net, holes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::isomorphic;

    fn add_ty() -> AgentType {
        AgentType::new("Add", 2)
    }

    fn succ_ty() -> AgentType {
        AgentType::new("Succ", 1)
    }

    fn zero_ty() -> AgentType {
        AgentType::new("Zero", 0)
    }

    fn add_zero_rule() -> Rule {
        let mut lhs = Pattern::new();
        let a = lhs.add_node(add_ty());
        let z = lhs.add_node(zero_ty());
        lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(z));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        lhs.add_boundary(TemplatePort::aux(a, 2));
        let mut rhs = Replacement::new(2);
        rhs.bind_passthrough(0, 1).unwrap();
        Rule::new("add-zero", lhs, rhs).unwrap()
    }

    fn add_succ_rule() -> Rule {
        let mut lhs = Pattern::new();
        let a = lhs.add_node(add_ty());
        let s = lhs.add_node(succ_ty());
        lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(s));
        lhs.add_boundary(TemplatePort::aux(s, 1));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        lhs.add_boundary(TemplatePort::aux(a, 2));
        let mut rhs = Replacement::new(3);
        let a2 = rhs.add_node(add_ty());
        let s2 = rhs.add_node(succ_ty());
        rhs.add_wire(TemplatePort::aux(a2, 2), TemplatePort::aux(s2, 1));
        rhs.bind_port(0, TemplatePort::principal(a2)).unwrap();
        rhs.bind_port(1, TemplatePort::aux(a2, 1)).unwrap();
        rhs.bind_port(2, TemplatePort::principal(s2)).unwrap();
        Rule::new("add-succ", lhs, rhs).unwrap()
    }

    fn peano() -> RuleSet {
        RuleSet::new(vec![add_zero_rule(), add_succ_rule()], &NoIo).unwrap()
    }

    /// Pattern over a single `F/1` node, both ports on the boundary.
    fn unary_pattern(name: &str) -> (Pattern, TemplateNodeId) {
        let mut lhs = Pattern::new();
        let f = lhs.add_node(AgentType::new(name, 1));
        lhs.add_boundary(TemplatePort::principal(f));
        lhs.add_boundary(TemplatePort::aux(f, 1));
        (lhs, f)
    }

    #[test]
    fn rule_construction_validates_templates() {
        let mut lhs = Pattern::new();
        let a = lhs.add_node(add_ty());
        let z = lhs.add_node(zero_ty());
        lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(z));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        // aux 2 uncovered
        let mut rhs = Replacement::new(1);
        rhs.bind_passthrough(0, 0).unwrap_err();
        let err = Rule::new("broken", lhs, rhs).unwrap_err();
        assert!(matches!(err, RuleError::Pattern(TemplateError::PortUncovered(_))));
    }

    #[test]
    fn rule_rejects_boundary_arity_mismatch() {
        let (lhs, _) = unary_pattern("F");
        let mut rhs = Replacement::new(3);
        let g = rhs.add_node(AgentType::new("G", 2));
        rhs.bind_port(0, TemplatePort::principal(g)).unwrap();
        rhs.bind_port(1, TemplatePort::aux(g, 1)).unwrap();
        rhs.bind_port(2, TemplatePort::aux(g, 2)).unwrap();
        let err = Rule::new("mismatch", lhs, rhs).unwrap_err();
        assert_eq!(
            err,
            RuleError::BoundaryArityMismatch {
                pattern: 2,
                replacement: 3
            }
        );
    }

    #[test]
    fn rule_rejects_label_disagreement() {
        let mut lhs = Pattern::new();
        let f = lhs.add_node(AgentType::new("F", 1));
        lhs.add_labeled_boundary(TemplatePort::principal(f), "in");
        lhs.add_boundary(TemplatePort::aux(f, 1));
        let mut rhs = Replacement::new(2);
        let g = rhs.add_node(AgentType::new("G", 1));
        rhs.bind_port(0, TemplatePort::principal(g)).unwrap();
        rhs.bind_port(1, TemplatePort::aux(g, 1)).unwrap();
        rhs.set_label(0, "out").unwrap();
        let err = Rule::new("labels", lhs, rhs).unwrap_err();
        assert_eq!(err, RuleError::BoundarySignatureMismatch(0));
    }

    #[test]
    fn ruleset_rejects_io_rules_in_general_band() {
        struct PrintIsIo;
        impl IoPolicy for PrintIsIo {
            fn is_io_agent(&self, ty: &AgentType) -> bool {
                ty.name() == "Print"
            }
        }
        let mut lhs = Pattern::new();
        let p = lhs.add_node(AgentType::new("Print", 1));
        let z = lhs.add_node(zero_ty());
        lhs.add_wire(TemplatePort::principal(p), TemplatePort::principal(z));
        lhs.add_boundary(TemplatePort::aux(p, 1));
        let mut rhs = Replacement::new(1);
        let z2 = rhs.add_node(zero_ty());
        rhs.bind_port(0, TemplatePort::principal(z2)).unwrap();
        let print_rule = Rule::new("print-zero", lhs, rhs).unwrap();

        let err = RuleSet::new(vec![print_rule.clone()], &PrintIsIo).unwrap_err();
        assert_eq!(
            err,
            RuleError::IoRuleRequired {
                rule: "print-zero".into(),
                agent_type: "Print".into()
            }
        );

        // The dedicated channel accepts it, at higher priority.
        let set = RuleSet::new(vec![add_zero_rule()], &PrintIsIo).unwrap();
        let (set, io_id) = set.add_io_rule(print_rule);
        let first = set.rules_by_priority().next().unwrap().0;
        assert_eq!(first, io_id);
    }

    #[test]
    fn rule_io_type_names_the_offending_symbol() {
        struct EmitIsIo;
        impl IoPolicy for EmitIsIo {
            fn is_io_agent(&self, ty: &AgentType) -> bool {
                ty.name() == "Emit"
            }
        }
        // Replacement-only I/O types are classified too.
        let mut lhs = Pattern::new();
        let z = lhs.add_node(zero_ty());
        let d = lhs.add_node(AgentType::new("Drop", 0));
        lhs.add_wire(TemplatePort::principal(z), TemplatePort::principal(d));
        let mut rhs = Replacement::new(0);
        let e = rhs.add_node(AgentType::new("Emit", 0));
        let e2 = rhs.add_node(AgentType::new("Emit", 0));
        rhs.add_wire(TemplatePort::principal(e), TemplatePort::principal(e2));
        let rule = Rule::new("drop-zero", lhs, rhs).unwrap();

        assert_eq!(rule.io_type(&EmitIsIo).map(AgentType::name), Some("Emit"));
        assert!(rule.io_type(&NoIo).is_none());
        assert!(add_zero_rule().io_type(&EmitIsIo).is_none());
    }

    #[test]
    fn override_reorders_general_band() {
        let set = peano();
        let ids: Vec<RuleId> = set.rules_by_priority().map(|(id, _)| id).collect();
        assert_eq!(set.prioritize(ids[0], ids[1]).unwrap(), Ordering::Less);
        let set = set.override_rule(ids[1], ids[0]).unwrap();
        assert_eq!(set.prioritize(ids[1], ids[0]).unwrap(), Ordering::Less);
        let reordered: Vec<RuleId> = set.rules_by_priority().map(|(id, _)| id).collect();
        assert_eq!(reordered, vec![ids[1], ids[0]]);
    }

    #[test]
    fn peano_rules_have_no_critical_pairs() {
        // Add-Zero and Add-Succ demand different types at Add's principal
        // port, so no net presents both redexes on shared agents.
        let set = peano();
        assert!(set.find_critical_pairs().is_empty());
        assert!(set.conflict_check().is_empty());
        assert!(set.confluence_check());
    }

    #[test]
    fn racing_rules_are_caught_and_fail_commutation() {
        // Two rules over the same A-B active pair: one erases it, one
        // builds a C. They race, and the outcomes differ.
        let a_ty = AgentType::new("A", 1);
        let b_ty = AgentType::new("B", 1);
        let mut lhs = Pattern::new();
        let a = lhs.add_node(a_ty.clone());
        let b = lhs.add_node(b_ty.clone());
        lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(b));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        lhs.add_boundary(TemplatePort::aux(b, 1));

        let mut erase = Replacement::new(2);
        erase.bind_passthrough(0, 1).unwrap();
        let mut build = Replacement::new(2);
        let c = build.add_node(AgentType::new("C", 1));
        build.bind_port(0, TemplatePort::principal(c)).unwrap();
        build.bind_port(1, TemplatePort::aux(c, 1)).unwrap();

        let set = RuleSet::new(
            vec![
                Rule::new("ab-erase", lhs.clone(), erase).unwrap(),
                Rule::new("ab-build", lhs, build).unwrap(),
            ],
            &NoIo,
        )
        .unwrap();

        let pairs = set.find_critical_pairs();
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_ne!(pair.left, pair.right);
        assert!(pair.overlap.is_well_formed());
        assert!(!set.commute(pair));
        assert!(!set.confluence_check());
    }

    #[test]
    fn symmetric_self_overlap_commutes() {
        // D-D is matched two ways (the gluing that swaps the nodes); both
        // orders fire the same rule once, so the pair commutes.
        let d_ty = AgentType::new("D", 1);
        let mut lhs = Pattern::new();
        let d1 = lhs.add_node(d_ty.clone());
        let d2 = lhs.add_node(d_ty);
        lhs.add_wire(TemplatePort::principal(d1), TemplatePort::principal(d2));
        lhs.add_boundary(TemplatePort::aux(d1, 1));
        lhs.add_boundary(TemplatePort::aux(d2, 1));
        let mut rhs = Replacement::new(2);
        rhs.bind_passthrough(0, 1).unwrap();

        let set = RuleSet::new(vec![Rule::new("dd-erase", lhs, rhs).unwrap()], &NoIo).unwrap();
        let pairs = set.find_critical_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].left, pairs[0].right);
        assert!(set.commute(&pairs[0]));
        assert!(set.confluence_check());
    }

    #[test]
    fn compose_chains_two_rules() {
        // F -> G·H, then G·H -> K: the composition is F -> K.
        let (f_lhs, _) = unary_pattern("F");
        let mut f_rhs = Replacement::new(2);
        let g = f_rhs.add_node(AgentType::new("G", 1));
        let h = f_rhs.add_node(AgentType::new("H", 1));
        f_rhs.add_wire(TemplatePort::aux(g, 1), TemplatePort::principal(h));
        f_rhs.bind_port(0, TemplatePort::principal(g)).unwrap();
        f_rhs.bind_port(1, TemplatePort::aux(h, 1)).unwrap();
        let first = Rule::new("f-split", f_lhs, f_rhs).unwrap();

        let mut gh_lhs = Pattern::new();
        let g2 = gh_lhs.add_node(AgentType::new("G", 1));
        let h2 = gh_lhs.add_node(AgentType::new("H", 1));
        gh_lhs.add_wire(TemplatePort::aux(g2, 1), TemplatePort::principal(h2));
        gh_lhs.add_boundary(TemplatePort::principal(g2));
        gh_lhs.add_boundary(TemplatePort::aux(h2, 1));
        let mut gh_rhs = Replacement::new(2);
        let k = gh_rhs.add_node(AgentType::new("K", 1));
        gh_rhs.bind_port(0, TemplatePort::principal(k)).unwrap();
        gh_rhs.bind_port(1, TemplatePort::aux(k, 1)).unwrap();
        let second = Rule::new("gh-fuse", gh_lhs, gh_rhs).unwrap();

        let composed = compose_rules(&first, &second).expect("composable");
        assert_eq!(composed.name(), "f-split>gh-fuse");
        assert_eq!(composed.replacement().node_count(), 1);
        let (_, ty) = composed.replacement().nodes().next().unwrap();
        assert_eq!(ty, &AgentType::new("K", 1));

        // One composed step equals the two-step reduction.
        let (net, f) = Net::new().add_agent(AgentType::new("F", 1));
        let (net, x) = net.add_agent(AgentType::new("X", 0));
        let (net, y) = net.add_agent(AgentType::new("Y", 0));
        let net = net
            .connect(Port::principal(f), Port::principal(x))
            .unwrap()
            .connect(Port::aux(f, 1), Port::principal(y))
            .unwrap();

        let two_step = {
            let net = net.clone();
            let m = find_match(first.pattern(), &net).unwrap();
            let net = apply(net, first.pattern(), first.replacement(), &m).unwrap();
            let m = find_match(second.pattern(), &net).unwrap();
            apply(net, second.pattern(), second.replacement(), &m).unwrap()
        };
        let one_step = {
            let m = find_match(composed.pattern(), &net).unwrap();
            apply(net, composed.pattern(), composed.replacement(), &m).unwrap()
        };
        assert!(isomorphic(&one_step, &two_step));
    }

    #[test]
    fn compose_returns_none_without_overlap() {
        // Add-Succ's replacement contains no Add-Zero redex.
        assert!(compose_rules(&add_succ_rule(), &add_zero_rule()).is_none());
    }
}
