//! Pattern matching: embedding rule left-hand sides into nets.
//!
//! Matching is seeded by scanning the net for agents of the pattern root's
//! type, in agent-creation order. From a seed, extension is *forced*: every
//! port carries at most one wire, so each pattern wire determines exactly
//! which net port must sit at the other end. A candidate either extends to a
//! full match or fails; there is no in-candidate backtracking, which makes
//! matching deterministic for a fixed net and insertion history.
//!
//! # Citations
//! - Subgraph isomorphism: Ullmann, "An algorithm for subgraph isomorphism"
//!   (1976)
//! - Rigid port-graph matching: Lafont, "Interaction nets", POPL (1990), §2

use crate::core::{AgentId, Net, Port};
use crate::pattern::{Pattern, TemplateNodeId, TemplatePort};
use std::collections::{HashMap, HashSet};

/// A match: an injective, structure-preserving embedding of a pattern into
/// a net, plus the induced boundary mapping.
///
/// `boundary[i]` is the *outside* port: the net port wired to the image of
/// the pattern's `i`-th boundary port. It records what the surrounding net
/// contributes at that slot; it is never a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    nodes: HashMap<TemplateNodeId, AgentId>,
    boundary: Vec<Port>,
}

impl Match {
    /// Returns the net agent a pattern node is mapped to.
    #[inline]
    pub fn node(&self, node: TemplateNodeId) -> Option<AgentId> {
        self.nodes.get(&node).copied()
    }

    /// Returns the net port a pattern port is mapped to.
    #[inline]
    pub fn image(&self, port: TemplatePort) -> Option<Port> {
        self.node(port.node).map(|agent| Port::new(agent, port.index))
    }

    /// Ordered outside ports, aligned with the pattern boundary.
    #[inline]
    pub fn boundary(&self) -> &[Port] {
        &self.boundary
    }

    /// The redex: matched net agents, sorted by id.
    pub fn redex(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.nodes.values().copied().collect();
        agents.sort();
        agents
    }

    /// Number of matched pattern nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Finds the first match of `pattern` in `net`, or `None`.
///
/// "No match" is a normal outcome, not an error. The first successful
/// candidate in net agent-creation order wins.
pub fn find_match(pattern: &Pattern, net: &Net) -> Option<Match> {
    find_all_matches(pattern, net).next()
}

/// Returns a lazy iterator over all matches of `pattern` in `net`.
///
/// The sequence is finite (one candidate per root-typed agent) and
/// restartable by calling again. The empty pattern matches trivially,
/// exactly once; it is internal machinery and rejected by rule validation.
pub fn find_all_matches<'a>(pattern: &'a Pattern, net: &'a Net) -> Matches<'a> {
    let candidates = if pattern.is_empty() {
        Vec::new()
    } else {
        let root_ty = pattern
            .root()
            .and_then(|root| pattern.node_type(root))
            .cloned();
        match root_ty {
            Some(ty) => net
                .agents_sorted()
                .into_iter()
                .filter(|agent| agent.ty == ty)
                .map(|agent| agent.id)
                .collect(),
            None => Vec::new(),
        }
    };
    Matches {
        pattern,
        net,
        candidates,
        next: 0,
        trivial_pending: pattern.is_empty(),
    }
}

/// Lazy sequence of matches; see [`find_all_matches`].
pub struct Matches<'a> {
    pattern: &'a Pattern,
    net: &'a Net,
    candidates: Vec<AgentId>,
    next: usize,
    trivial_pending: bool,
}

impl Iterator for Matches<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if self.trivial_pending {
            self.trivial_pending = false;
            return Some(Match {
                nodes: HashMap::new(),
                boundary: Vec::new(),
            });
        }
        while self.next < self.candidates.len() {
            let seed = self.candidates[self.next];
            self.next += 1;
            if let Some(found) = try_extend(self.pattern, self.net, seed) {
                return Some(found);
            }
        }
        None
    }
}

/// Attempts the forced extension of `root -> seed` to a full match.
///
/// Processes pattern wires in insertion order, deferring wires whose
/// endpoints are both still unmapped (the pattern is connected, so every
/// wire eventually has a mapped endpoint). Fails on any type, index, or
/// wiring disagreement, on injectivity collisions, and on shared pattern
/// positions resolving to different net agents.
fn try_extend(pattern: &Pattern, net: &Net, seed: AgentId) -> Option<Match> {
    let root = pattern.root()?;
    let mut nodes: HashMap<TemplateNodeId, AgentId> = HashMap::from([(root, seed)]);
    let mut used: HashSet<AgentId> = HashSet::from([seed]);

    let mut pending: Vec<(TemplatePort, TemplatePort)> = pattern.wires().to_vec();
    while !pending.is_empty() {
        let position = pending
            .iter()
            .position(|(p, q)| nodes.contains_key(&p.node) || nodes.contains_key(&q.node))?;
        let (mut p, mut q) = pending.remove(position);
        if !nodes.contains_key(&p.node) {
            std::mem::swap(&mut p, &mut q);
        }

        let net_p = Port::new(nodes[&p.node], p.index);
        let peer = net.peer(net_p)?;
        if peer.index != q.index {
            return None;
        }
        let peer_ty = &net.agent(peer.agent)?.ty;
        if peer_ty != pattern.node_type(q.node)? {
            return None;
        }
        match nodes.get(&q.node) {
            // Shared position: both routes must land on the same agent.
            Some(&mapped) => {
                if mapped != peer.agent {
                    return None;
                }
            }
            None => {
                // Injectivity: one net agent per pattern node.
                if !used.insert(peer.agent) {
                    return None;
                }
                nodes.insert(q.node, peer.agent);
            }
        }
    }

    // Connectivity guarantees full coverage; a gap means the pattern was
    // never validated.
    if nodes.len() != pattern.node_count() {
        return None;
    }

    let mut boundary = Vec::with_capacity(pattern.boundary().len());
    for bp in pattern.boundary() {
        let image = Port::new(nodes[&bp.node], bp.index);
        // A dangling outside is only possible in template nets (rule
        // composition); in a well-formed net the peer always exists.
        boundary.push(net.peer(image)?);
    }

    Some(Match { nodes, boundary })
}
