//! Core data structures for interaction nets.
//!
//! Implements the net store: agents with typed, fixed-arity port interfaces,
//! undirected wires joining exactly two ports, and the `Net` value that owns
//! both. Mutating operations consume the net and return a new one, so Rust's
//! move semantics enforce the linear-resource discipline: a consumed net
//! cannot be aliased.
//!
//! # Citations
//! - Lafont, "Interaction nets", POPL (1990)
//! - Fernández & Mackie, "A calculus for interaction nets" (1999)
//! - Linear resources: Girard, "Linear logic" (1987)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Unique identifier for an agent in a net.
///
/// Uses a transparent `u64` wrapper for efficient comparison and hashing.
/// Ids are allocated monotonically by the net and are never reused, so
/// agent-creation order is recoverable by sorting.
///
/// # Invariant
/// - `AgentId`s are unique within a given `Net` instance.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(u64);

impl AgentId {
    /// Creates an `AgentId` from a raw `u64`.
    ///
    /// Prefer ids allocated by [`Net::add_agent`]; raw construction is for
    /// tests and deserialization.
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

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", self.0)
    }
}

/// The type tag of an agent: a symbol plus its auxiliary arity.
///
/// An agent of type `T/n` has `n + 1` ports: port `0` is the principal
/// port, ports `1..=n` are auxiliary. Arity is fixed by the type; the net
/// never resizes an agent's interface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentType {
    /// Symbol naming the type.
    name: String,
    /// Number of auxiliary ports (principal port excluded).
    arity: u16,
}

impl AgentType {
    /// Creates a new agent type with the given symbol and auxiliary arity.
    pub fn new(name: impl Into<String>, arity: u16) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    /// Returns the type symbol.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the auxiliary arity (ports beyond the principal).
    #[inline]
    pub fn arity(&self) -> u16 {
        self.arity
    }

    /// Returns the total number of ports, principal included.
    ///
    /// Widened past `u16` so the maximum arity still counts its principal
    /// port.
    #[inline]
    pub fn port_count(&self) -> u32 {
        u32::from(self.arity) + 1
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// An agent: a typed node with a fixed port interface.
///
/// Agents are created by [`Net::add_agent`] and destroyed only by
/// [`Net::remove_agent`] (which rewrite steps use to consume a redex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: AgentId,
    /// Type tag, fixing the port interface.
    pub ty: AgentType,
}

impl Agent {
    /// Returns an iterator over this agent's ports, principal first.
    pub fn ports(&self) -> impl Iterator<Item = Port> + '_ {
        let id = self.id;
        (0..=self.ty.arity()).map(move |idx| Port::new(id, idx))
    }
}

/// A port: a numbered connection point on an agent.
///
/// Index `0` is the principal port; higher indices are auxiliary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Port {
    /// Owning agent.
    pub agent: AgentId,
    /// Port index on the agent (0 = principal).
    pub index: u16,
}

impl Port {
    /// Creates a port reference from agent and index.
    #[inline]
    pub const fn new(agent: AgentId, index: u16) -> Self {
        Self { agent, index }
    }

    /// The principal port of an agent.
    #[inline]
    pub const fn principal(agent: AgentId) -> Self {
        Self { agent, index: 0 }
    }

    /// The `i`-th auxiliary port of an agent (1-based, so `aux(a, 1)` is the
    /// first auxiliary port).
    #[inline]
    pub const fn aux(agent: AgentId, i: u16) -> Self {
        Self { agent, index: i }
    }

    /// Returns true for the principal port.
    #[inline]
    pub const fn is_principal(&self) -> bool {
        self.index == 0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.agent, self.index)
    }
}

/// Error type for net store operations.
///
/// All variants are reported, recoverable conditions. Consuming operations
/// return them wrapped in [`NetOpError`] so the untouched net rides back to
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Referenced agent id is not present in the net.
    UnknownAgent(AgentId),
    /// Port index is out of range for the agent's type.
    PortOutOfRange(Port),
    /// Port already participates in a wire; disconnect first.
    PortOccupied(Port),
    /// Port has no wire to disconnect.
    PortNotWired(Port),
    /// Attempted to wire a port to itself.
    SelfWire(Port),
    /// Well-formedness violation: a live port with no wire.
    DanglingPort(Port),
    /// Well-formedness violation: wiring refers to a dead agent.
    StaleWire(Port),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::UnknownAgent(id) => write!(f, "unknown agent {id}"),
            NetError::PortOutOfRange(p) => write!(f, "port {p} out of range"),
            NetError::PortOccupied(p) => write!(f, "port {p} already wired"),
            NetError::PortNotWired(p) => write!(f, "port {p} has no wire"),
            NetError::SelfWire(p) => write!(f, "cannot wire port {p} to itself"),
            NetError::DanglingPort(p) => write!(f, "dangling port {p}"),
            NetError::StaleWire(p) => write!(f, "wire endpoint {p} has no agent"),
        }
    }
}

impl std::error::Error for NetError {}

/// A failed consuming operation: the error plus the net, unchanged.
#[derive(Debug)]
pub struct NetOpError {
    /// What went wrong.
    pub error: NetError,
    /// The net, exactly as it was before the failed operation.
    pub net: Net,
}

impl fmt::Display for NetOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for NetOpError {}

/// An interaction net: agents plus the wiring over their ports.
///
/// # Invariants
/// - Agent ids are unique and allocated monotonically.
/// - Each port participates in at most one wire; a wire joins two distinct
///   ports of live agents.
/// - *Well-formedness* (checked by [`Net::validate`]): every port of every
///   live agent is covered by exactly one wire. Dangling ports are permitted
///   only transiently, between store operations, never across an observable
///   net state handed to the matcher or scheduler.
///
/// The wiring is stored as a symmetric map `port -> peer`, so peer lookup is
/// a single probe and each wire appears as two mirrored entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Net {
    /// Mapping from agent id to agent data.
    agents: HashMap<AgentId, Agent>,
    /// Symmetric wiring: both endpoints of every wire are keys.
    wiring: HashMap<Port, Port>,
    /// Next available agent id.
    next_id: u64,
}

impl Net {
    /// Creates a new, empty net.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live agents.
    #[inline]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Returns the number of wires.
    #[inline]
    pub fn wire_count(&self) -> usize {
        self.wiring.len() / 2
    }

    /// Looks up an agent by id.
    #[inline]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Checks whether an agent is live.
    #[inline]
    pub fn contains_agent(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    /// Returns all agents sorted by id (agent-creation order).
    ///
    /// Guaranteed to produce the same sequence across runs for the same
    /// insertion history; the matcher's determinism rests on this.
    pub fn agents_sorted(&self) -> Vec<&Agent> {
        let mut items: Vec<_> = self.agents.values().collect();
        items.sort_by_key(|a| a.id);
        items
    }

    /// Returns all wires as canonically ordered port pairs, sorted.
    ///
    /// Each wire appears once, with its lesser endpoint first.
    pub fn wires_sorted(&self) -> Vec<(Port, Port)> {
        let mut wires: Vec<(Port, Port)> = self
            .wiring
            .iter()
            .filter(|(p, q)| *p < *q)
            .map(|(p, q)| (*p, *q))
            .collect();
        wires.sort();
        wires
    }

    /// Returns the peer of a port, if it is wired.
    #[inline]
    pub fn peer(&self, port: Port) -> Option<Port> {
        self.wiring.get(&port).copied()
    }

    /// Returns the set of agents adjacent to `id`, sorted by id.
    ///
    /// An agent wired to itself (through two of its own ports) is not its
    /// own neighbor.
    pub fn neighbors(&self, id: AgentId) -> Vec<AgentId> {
        let Some(agent) = self.agents.get(&id) else {
            return Vec::new();
        };
        let mut out: BTreeSet<AgentId> = BTreeSet::new();
        for port in agent.ports() {
            if let Some(peer) = self.peer(port) {
                if peer.agent != id {
                    out.insert(peer.agent);
                }
            }
        }
        out.into_iter().collect()
    }

    /// Returns the port facing this agent's principal port, if wired.
    ///
    /// Wires are undirected; the principal/auxiliary split is the only
    /// directionality a net has, so this plays the role of an "incoming"
    /// traversal helper.
    #[inline]
    pub fn principal_peer(&self, id: AgentId) -> Option<Port> {
        self.peer(Port::principal(id))
    }

    /// Returns the peers of this agent's auxiliary ports, in port order.
    ///
    /// The "outgoing" counterpart of [`Net::principal_peer`]. Unwired
    /// auxiliary ports yield `None` in their slot.
    pub fn aux_peers(&self, id: AgentId) -> Vec<Option<Port>> {
        let Some(agent) = self.agents.get(&id) else {
            return Vec::new();
        };
        (1..=agent.ty.arity())
            .map(|idx| self.peer(Port::aux(id, idx)))
            .collect()
    }

    /// Allocates a fresh agent of the given type; all its ports dangling.
    pub fn add_agent(mut self, ty: AgentType) -> (Net, AgentId) {
        let id = AgentId::new(self.next_id);
        self.next_id += 1;
        self.agents.insert(id, Agent { id, ty });
        (self, id)
    }

    /// Removes an agent and every wire touching its ports.
    ///
    /// Fails with [`NetError::UnknownAgent`] if the id is not live; the
    /// unchanged net rides back in the error.
    pub fn remove_agent(mut self, id: AgentId) -> Result<Net, NetOpError> {
        let Some(agent) = self.agents.remove(&id) else {
            return Err(NetOpError {
                error: NetError::UnknownAgent(id),
                net: self,
            });
        };
        for port in agent.ports() {
            if let Some(peer) = self.wiring.remove(&port) {
                self.wiring.remove(&peer);
            }
        }
        Ok(self)
    }

    /// Wires two dangling ports together.
    ///
    /// Fails if the ports coincide, if either agent is dead or the index out
    /// of range, or if either port is already wired (disconnect first).
    pub fn connect(mut self, a: Port, b: Port) -> Result<Net, NetOpError> {
        if a == b {
            return self.fail(NetError::SelfWire(a));
        }
        for port in [a, b] {
            match self.agents.get(&port.agent) {
                None => return self.fail(NetError::UnknownAgent(port.agent)),
                Some(agent) if port.index > agent.ty.arity() => {
                    return self.fail(NetError::PortOutOfRange(port));
                }
                Some(_) => {}
            }
            if self.wiring.contains_key(&port) {
                return self.fail(NetError::PortOccupied(port));
            }
        }
        self.wiring.insert(a, b);
        self.wiring.insert(b, a);
        Ok(self)
    }

    /// Removes the wire at `port`, leaving both former endpoints dangling.
    ///
    /// Fails with [`NetError::PortNotWired`] if the port has no wire.
    pub fn disconnect(mut self, port: Port) -> Result<Net, NetOpError> {
        match self.wiring.remove(&port) {
            Some(peer) => {
                self.wiring.remove(&peer);
                Ok(self)
            }
            None => self.fail(NetError::PortNotWired(port)),
        }
    }

    /// Checks well-formedness: every port of every live agent covered by
    /// exactly one wire, no stale endpoints.
    ///
    /// A violation observed on a net the engine produced (as opposed to one
    /// under construction) is an engine bug, not a user-data problem; the
    /// rewriter `debug_assert!`s this after every step.
    pub fn validate(&self) -> Result<(), NetError> {
        for agent in self.agents.values() {
            for port in agent.ports() {
                match self.wiring.get(&port) {
                    None => return Err(NetError::DanglingPort(port)),
                    Some(peer) => {
                        if *peer == port {
                            return Err(NetError::SelfWire(port));
                        }
                        if self.wiring.get(peer) != Some(&port) {
                            return Err(NetError::StaleWire(*peer));
                        }
                    }
                }
            }
        }
        for (port, peer) in &self.wiring {
            for endpoint in [port, peer] {
                match self.agents.get(&endpoint.agent) {
                    None => return Err(NetError::StaleWire(*endpoint)),
                    Some(agent) if endpoint.index > agent.ty.arity() => {
                        return Err(NetError::PortOutOfRange(*endpoint));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Convenience wrapper over [`Net::validate`].
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    fn fail(self, error: NetError) -> Result<Net, NetOpError> {
        Err(NetOpError { error, net: self })
    }
}
