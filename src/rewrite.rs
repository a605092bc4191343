//! Rewrite application: replacing a matched redex inside a net.
//!
//! A rewrite step removes the matched agents, instantiates the replacement
//! template with fresh agent ids, and splices the replacement's boundary
//! into the wires the redex left dangling. Agents outside the redex are
//! never touched, so a step is local: its effect is confined to the redex
//! and the wires crossing its boundary.
//!
//! Splicing has to resolve chains. A boundary wire may lead back into the
//! redex (two boundary ports wired to each other) or through a pass-through
//! slot of the replacement; both are followed until a concrete port is
//! reached on each side. A chain that closes on itself has no ports left to
//! carry it, so it is erased outright (the vicious circle of interaction-net
//! folklore).
//!
//! # Citations
//! - Lafont, "Interaction nets", POPL (1990), §2
//! - Vicious circles: Fernández & Mackie, "A calculus for interaction
//!   nets" (1999), §5

use crate::core::{AgentId, Net, NetError, Port};
use crate::matcher::Match;
use crate::pattern::{BoundarySpot, Pattern, Replacement, TemplateNodeId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Error type for rewrite application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// Pattern and replacement disagree on boundary length.
    BoundaryArityMismatch {
        /// Boundary slots declared by the pattern.
        pattern: usize,
        /// Boundary slots declared by the replacement.
        replacement: usize,
    },
    /// The match no longer embeds into the net (agents gone, types changed,
    /// or boundary wires moved since it was found).
    StaleMatch,
    /// Re-wiring failed; the rule's templates were never validated.
    Wiring(NetError),
}

impl fmt::Display for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteError::BoundaryArityMismatch {
                pattern,
                replacement,
            } => write!(
                f,
                "boundary arity mismatch: pattern has {pattern} slots, replacement {replacement}"
            ),
            RewriteError::StaleMatch => write!(f, "match is stale against this net"),
            RewriteError::Wiring(err) => write!(f, "replacement wiring failed: {err}"),
        }
    }
}

impl std::error::Error for RewriteError {}

/// A failed rewrite: the error plus the net as it was before the attempt.
#[derive(Debug)]
pub struct RewriteOpError {
    /// What went wrong.
    pub error: RewriteError,
    /// The net, unchanged.
    pub net: Net,
}

impl fmt::Display for RewriteOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for RewriteOpError {}

/// Applies one rewrite: removes the redex of `found`, instantiates
/// `replacement`, and splices its boundary into the surrounding wires.
///
/// The match is re-verified against the net first; a stale match is
/// rejected with the net unchanged rather than applied blindly. On success
/// the result is well-formed whenever the input was (checked with a debug
/// assertion after every step).
pub fn apply(
    net: Net,
    pattern: &Pattern,
    replacement: &Replacement,
    found: &Match,
) -> Result<Net, RewriteOpError> {
    if pattern.boundary().len() != replacement.boundary().len() {
        return fail(
            net,
            RewriteError::BoundaryArityMismatch {
                pattern: pattern.boundary().len(),
                replacement: replacement.boundary().len(),
            },
        );
    }

    // Staleness: every matched agent must still be live with its matched
    // type, and every boundary wire must still lead where the match saw it.
    for (node, ty) in pattern.nodes() {
        match found.node(node).and_then(|id| net.agent(id)) {
            Some(agent) if agent.ty == *ty => {}
            _ => return fail(net, RewriteError::StaleMatch),
        }
    }
    let mut images: Vec<Port> = Vec::with_capacity(pattern.boundary().len());
    for bp in pattern.boundary() {
        match found.image(*bp) {
            Some(image) => images.push(image),
            None => return fail(net, RewriteError::StaleMatch),
        }
    }
    for (image, outside) in images.iter().zip(found.boundary()) {
        if net.peer(*image) != Some(*outside) {
            return fail(net, RewriteError::StaleMatch);
        }
    }

    let redex = found.redex();
    let slot_of_image: HashMap<Port, usize> = images
        .iter()
        .enumerate()
        .map(|(i, image)| (*image, i))
        .collect();

    let mut net = net;
    for id in &redex {
        net = match net.remove_agent(*id) {
            Ok(next) => next,
            Err(err) => return fail(err.net, RewriteError::StaleMatch),
        };
    }

    let mut spawned: HashMap<TemplateNodeId, AgentId> = HashMap::new();
    for (tid, ty) in replacement.nodes() {
        let (next, id) = net.add_agent(ty.clone());
        net = next;
        spawned.insert(tid, id);
    }
    for (a, b) in replacement.wires() {
        let (Some(&pa), Some(&pb)) = (spawned.get(&a.node), spawned.get(&b.node)) else {
            return fail(net, RewriteError::StaleMatch);
        };
        net = match net.connect(Port::new(pa, a.index), Port::new(pb, b.index)) {
            Ok(next) => next,
            Err(err) => return fail(err.net, RewriteError::Wiring(err.error)),
        };
    }

    let splice = Splice {
        outside: found.boundary(),
        slot_of_image: &slot_of_image,
        replacement,
        spawned: &spawned,
    };
    let mut new_wires: BTreeSet<(Port, Port)> = BTreeSet::new();
    for (i, spot) in replacement.boundary().iter().enumerate() {
        match spot {
            BoundarySpot::Port(tp) => {
                let Some(&owner) = spawned.get(&tp.node) else {
                    return fail(net, RewriteError::StaleMatch);
                };
                let inside = Port::new(owner, tp.index);
                let mut seen = HashSet::new();
                if let Some(end) = splice.follow_out(i, &mut seen) {
                    new_wires.insert(ordered(inside, end));
                }
            }
            BoundarySpot::Passthrough(j) if i < *j => {
                // Shared visit set so a loop threading both slots is caught.
                let mut seen = HashSet::new();
                let left = splice.follow_out(i, &mut seen);
                let right = splice.follow_out(*j, &mut seen);
                if let (Some(a), Some(b)) = (left, right) {
                    new_wires.insert(ordered(a, b));
                }
            }
            _ => {}
        }
    }
    for (a, b) in new_wires {
        net = match net.connect(a, b) {
            Ok(next) => next,
            Err(err) => return fail(err.net, RewriteError::Wiring(err.error)),
        };
    }

    tracing::debug!(
        removed = redex.len(),
        spawned = replacement.node_count(),
        agents = net.agent_count(),
        "applied rewrite"
    );
    debug_assert!(net.validate().is_ok(), "rewrite broke well-formedness");
    Ok(net)
}

fn fail(net: Net, error: RewriteError) -> Result<Net, RewriteOpError> {
    Err(RewriteOpError { error, net })
}

#[inline]
fn ordered(a: Port, b: Port) -> (Port, Port) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Boundary chain resolution context.
struct Splice<'a> {
    outside: &'a [Port],
    slot_of_image: &'a HashMap<Port, usize>,
    replacement: &'a Replacement,
    spawned: &'a HashMap<TemplateNodeId, AgentId>,
}

impl Splice<'_> {
    /// Follows the wire leaving slot `i` outward until it terminates at a
    /// concrete port: either a genuine outside port, or a replacement port
    /// reached by re-entering the redex through another boundary slot.
    ///
    /// Returns `None` when the chain closes on itself; such a circle has no
    /// port to attach to and is erased.
    fn follow_out(&self, slot: usize, seen: &mut HashSet<usize>) -> Option<Port> {
        if !seen.insert(slot) {
            return None;
        }
        let out = self.outside[slot];
        let Some(&entry) = self.slot_of_image.get(&out) else {
            return Some(out);
        };
        // The wire re-enters the removed redex at boundary slot `entry`;
        // continue with whatever the replacement puts there.
        match self.replacement.boundary()[entry] {
            BoundarySpot::Port(tp) => self
                .spawned
                .get(&tp.node)
                .map(|&owner| Port::new(owner, tp.index)),
            BoundarySpot::Passthrough(next) => self.follow_out(next, seen),
            // Unbound slots are rejected at rule construction.
            BoundarySpot::Unbound => None,
        }
    }
}
