//! Structural fingerprints and isomorphism checking for nets.
//!
//! Provides deterministic structural hashing via WL (Weisfeiler–Lehman)
//! refinement with domain separation and length prefixing, plus an exact
//! isomorphism check used by the confluence machinery and the determinism
//! properties. Fingerprints are invariant under agent renaming: isomorphic
//! nets hash identically regardless of insertion history.
//!
//! # Citations
//! - Weisfeiler & Lehman, "A reduction of a graph to a canonical form" (1968)
//! - SHA-256: NIST FIPS 180-4 (2015)
//! - Domain separation & length prefixing: Bernstein et al., "How to hash
//!   into elliptic curves" (2009)

use crate::core::{AgentId, AgentType, Net, Port};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Hash domain for agent type tags.
const DOMAIN_AGENT_TYPE_V0: &[u8] = b"AGENT_TYPE_V0";
/// Hash domain for WL refinement rounds.
const DOMAIN_WL_ROUND_V0: &[u8] = b"WL_ROUND_V0";
/// Hash domain for whole-net fingerprints.
const DOMAIN_NET_V0: &[u8] = b"NET_V0";

/// A 256-bit hash value.
///
/// Wraps a byte array for type safety; equality and ordering are on the raw
/// bytes.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    /// Creates a zero hash (all zeros).
    #[inline]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns the raw byte array.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given data with domain separation.
    ///
    /// The digest input is `b"PWV:<domain>:v1" || len(data) as u64 LE || data`.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"PWV:");
        hasher.update(domain);
        hasher.update(b":v1");
        let len = data.len() as u64;
        hasher.update(len.to_le_bytes());
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HashValue({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Hashes an agent type tag (symbol + arity).
fn type_hash(ty: &AgentType) -> HashValue {
    let mut data = Vec::with_capacity(ty.name().len() + 10);
    data.extend_from_slice(&(ty.name().len() as u64).to_le_bytes());
    data.extend_from_slice(ty.name().as_bytes());
    data.extend_from_slice(&ty.arity().to_le_bytes());
    HashValue::hash_with_domain(DOMAIN_AGENT_TYPE_V0, &data)
}

/// Runs WL refinement over a net's agents.
///
/// Round 0 labels every agent with its type hash; each later round absorbs,
/// per port in index order, the peer's current label and peer port index.
/// Port indices make the neighborhood ordered, so no multiset sorting is
/// needed within one agent. After `rounds` iterations the labels separate
/// agents at least as finely as any `rounds`-step neighborhood can.
pub fn wl_refinement(net: &Net, rounds: usize) -> HashMap<AgentId, HashValue> {
    let agents = net.agents_sorted();
    let mut labels: HashMap<AgentId, HashValue> = agents
        .iter()
        .map(|agent| (agent.id, type_hash(&agent.ty)))
        .collect();

    for _ in 0..rounds {
        let mut next: HashMap<AgentId, HashValue> = HashMap::with_capacity(labels.len());
        for agent in &agents {
            let mut data = Vec::new();
            data.extend_from_slice(labels[&agent.id].as_bytes());
            for port in agent.ports() {
                match net.peer(port) {
                    Some(Port { agent: peer, index }) => {
                        data.push(1);
                        data.extend_from_slice(&index.to_le_bytes());
                        data.extend_from_slice(labels[&peer].as_bytes());
                    }
                    None => data.push(0),
                }
            }
            next.insert(agent.id, HashValue::hash_with_domain(DOMAIN_WL_ROUND_V0, &data));
        }
        labels = next;
    }
    labels
}

/// Computes a canonical fingerprint of a net, invariant under isomorphism.
///
/// Combines the sorted multiset of fully refined WL labels. Distinct nets
/// can in principle collide (WL is not a complete invariant); use
/// [`isomorphic`] where an exact answer is required.
pub fn net_fingerprint(net: &Net) -> HashValue {
    let labels = wl_refinement(net, net.agent_count());
    let mut multiset: Vec<[u8; 32]> = labels.values().map(|h| h.0).collect();
    multiset.sort();
    let mut data = Vec::with_capacity(multiset.len() * 32 + 8);
    data.extend_from_slice(&(net.agent_count() as u64).to_le_bytes());
    for hash in multiset {
        data.extend_from_slice(&hash);
    }
    HashValue::hash_with_domain(DOMAIN_NET_V0, &data)
}

/// Exact isomorphism test between two nets.
///
/// Screens with agent/wire counts and WL label multisets, then builds a
/// bijection component by component. Because every port carries at most one
/// wire, extending a candidate seed pair is forced (no branching inside a
/// component); the only search is over seed candidates, restricted to the
/// matching WL class. Matched components of the right net are isomorphic to
/// the component they absorbed, so greedy consumption is safe.
pub fn isomorphic(a: &Net, b: &Net) -> bool {
    if a.agent_count() != b.agent_count() || a.wire_count() != b.wire_count() {
        return false;
    }
    if a.agent_count() == 0 {
        return true;
    }
    let rounds = a.agent_count();
    let labels_a = wl_refinement(a, rounds);
    let labels_b = wl_refinement(b, rounds);
    let mut multiset_a: Vec<[u8; 32]> = labels_a.values().map(|h| h.0).collect();
    let mut multiset_b: Vec<[u8; 32]> = labels_b.values().map(|h| h.0).collect();
    multiset_a.sort();
    multiset_b.sort();
    if multiset_a != multiset_b {
        return false;
    }

    let mut mapped_a: HashMap<AgentId, AgentId> = HashMap::new();
    let mut used_b: HashMap<AgentId, AgentId> = HashMap::new();

    for agent in a.agents_sorted() {
        if mapped_a.contains_key(&agent.id) {
            continue;
        }
        // New component: try every same-labelled unused seed in b.
        let seed_label = labels_a[&agent.id];
        let mut found = false;
        for candidate in b.agents_sorted() {
            if used_b.contains_key(&candidate.id) || labels_b[&candidate.id] != seed_label {
                continue;
            }
            if let Some(component) = extend_component(a, b, agent.id, candidate.id, &used_b) {
                for (x, y) in component {
                    mapped_a.insert(x, y);
                    used_b.insert(y, x);
                }
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

/// Attempts the forced extension of `seed_a -> seed_b` over one component.
///
/// Returns the component's bijection on success, `None` on any structural
/// disagreement or collision with already-used agents of `b`.
fn extend_component(
    a: &Net,
    b: &Net,
    seed_a: AgentId,
    seed_b: AgentId,
    used_b: &HashMap<AgentId, AgentId>,
) -> Option<Vec<(AgentId, AgentId)>> {
    let mut map: HashMap<AgentId, AgentId> = HashMap::from([(seed_a, seed_b)]);
    let mut rev: HashMap<AgentId, AgentId> = HashMap::from([(seed_b, seed_a)]);
    let mut queue = vec![(seed_a, seed_b)];

    while let Some((x, y)) = queue.pop() {
        let ax = a.agent(x)?;
        let ay = b.agent(y)?;
        if ax.ty != ay.ty {
            return None;
        }
        for port in ax.ports() {
            let mirror = Port::new(y, port.index);
            match (a.peer(port), b.peer(mirror)) {
                (None, None) => {}
                (Some(pa), Some(pb)) => {
                    if pa.index != pb.index {
                        return None;
                    }
                    match map.get(&pa.agent) {
                        Some(&mapped) => {
                            if mapped != pb.agent {
                                return None;
                            }
                        }
                        None => {
                            if used_b.contains_key(&pb.agent) || rev.contains_key(&pb.agent) {
                                return None;
                            }
                            map.insert(pa.agent, pb.agent);
                            rev.insert(pb.agent, pa.agent);
                            queue.push((pa.agent, pb.agent));
                        }
                    }
                }
                _ => return None,
            }
        }
    }
    Some(map.into_iter().collect())
}
