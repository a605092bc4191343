//! Pattern and replacement templates for net rewriting.
//!
//! A `Pattern` is a small template graph matched against a net: typed nodes,
//! internal wires, and an ordered list of boundary ports that face the
//! surrounding net instead of being wired internally. A `Replacement` is the
//! same shape on the right-hand side of a rule, except that a boundary slot
//! may also be a pass-through joining two boundary positions directly, which
//! is how agent-erasing rules (`Add(Zero, y) -> y`) re-wire their interface.
//!
//! # Citations
//! - Interaction rules: Lafont, "Interaction nets", POPL (1990), §2
//! - Double-pushout rewriting: Ehrig et al., "Algebraic approach to graph
//!   transformation" (1999)

use crate::core::AgentType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// Identifier for a node inside a template; meaningless outside it.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateNodeId(u64);

impl TemplateNodeId {
    /// Returns the raw `u64` representation.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A port of a template node, mirroring [`crate::core::Port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemplatePort {
    /// Owning template node.
    pub node: TemplateNodeId,
    /// Port index (0 = principal).
    pub index: u16,
}

impl TemplatePort {
    /// Creates a template port reference.
    #[inline]
    pub const fn new(node: TemplateNodeId, index: u16) -> Self {
        Self { node, index }
    }

    /// The principal port of a template node.
    #[inline]
    pub const fn principal(node: TemplateNodeId) -> Self {
        Self { node, index: 0 }
    }

    /// The `i`-th auxiliary port (1-based).
    #[inline]
    pub const fn aux(node: TemplateNodeId, i: u16) -> Self {
        Self { node, index: i }
    }
}

/// Structural defect found while validating a template.
///
/// Surfaced to callers through `RuleError` at rule-construction time; these
/// are recoverable user errors, never silently ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Template has no nodes where at least one is required.
    Empty,
    /// Pattern has no root to seed matching from.
    MissingRoot,
    /// A wire or boundary references a node the template does not contain.
    UnknownNode(TemplateNodeId),
    /// Port index exceeds the node type's arity.
    PortOutOfRange(TemplatePort),
    /// A node port is neither wired internally nor on the boundary.
    PortUncovered(TemplatePort),
    /// A node port is wired or bound more than once.
    PortReused(TemplatePort),
    /// Pattern is not internally connected (isolated components).
    NotConnected,
    /// Replacement boundary slot was never bound.
    UnboundBoundary(usize),
    /// Pass-through slots do not pair up symmetrically.
    BadPassthrough(usize),
    /// Boundary index exceeds the declared boundary length.
    BoundaryOutOfRange(usize),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Empty => write!(f, "template has no nodes"),
            TemplateError::MissingRoot => write!(f, "pattern has no root node"),
            TemplateError::UnknownNode(n) => write!(f, "unknown template node {}", n.as_u64()),
            TemplateError::PortOutOfRange(p) => {
                write!(f, "template port {}:{} out of range", p.node.as_u64(), p.index)
            }
            TemplateError::PortUncovered(p) => {
                write!(f, "template port {}:{} uncovered", p.node.as_u64(), p.index)
            }
            TemplateError::PortReused(p) => {
                write!(f, "template port {}:{} used twice", p.node.as_u64(), p.index)
            }
            TemplateError::NotConnected => write!(f, "pattern is not connected"),
            TemplateError::UnboundBoundary(i) => write!(f, "boundary slot {i} unbound"),
            TemplateError::BadPassthrough(i) => write!(f, "boundary slot {i} pass-through unpaired"),
            TemplateError::BoundaryOutOfRange(i) => write!(f, "boundary index {i} out of range"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Left-hand-side template of a rule.
///
/// Built incrementally with the `add_*` methods; full validation happens at
/// rule construction, so a half-built pattern is representable but unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    nodes: BTreeMap<TemplateNodeId, AgentType>,
    wires: Vec<(TemplatePort, TemplatePort)>,
    boundary: Vec<TemplatePort>,
    labels: Vec<Option<String>>,
    root: Option<TemplateNodeId>,
    next_id: u64,
}

impl Pattern {
    /// Creates a new empty pattern.
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            wires: Vec::new(),
            boundary: Vec::new(),
            labels: Vec::new(),
            root: None,
            next_id: 0,
        }
    }

    /// Adds a typed node. The first node added becomes the root unless
    /// [`Pattern::set_root`] overrides it.
    pub fn add_node(&mut self, ty: AgentType) -> TemplateNodeId {
        let id = TemplateNodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, ty);
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Declares the root node that seeds matching.
    pub fn set_root(&mut self, node: TemplateNodeId) {
        self.root = Some(node);
    }

    /// Adds an internal wire between two template ports.
    pub fn add_wire(&mut self, a: TemplatePort, b: TemplatePort) {
        self.wires.push((a, b));
    }

    /// Appends a boundary port (unlabelled).
    ///
    /// Boundary order is significant: slot `i` aligns with the
    /// replacement's slot `i`.
    pub fn add_boundary(&mut self, port: TemplatePort) -> usize {
        self.boundary.push(port);
        self.labels.push(None);
        self.boundary.len() - 1
    }

    /// Appends a labelled boundary port.
    ///
    /// Labels are the hook for external port typing; a rule's pattern and
    /// replacement labels must agree positionally.
    pub fn add_labeled_boundary(&mut self, port: TemplatePort, label: impl Into<String>) -> usize {
        self.boundary.push(port);
        self.labels.push(Some(label.into()));
        self.boundary.len() - 1
    }

    /// Returns the root node, if declared.
    #[inline]
    pub fn root(&self) -> Option<TemplateNodeId> {
        self.root
    }

    /// Returns the type of a template node.
    #[inline]
    pub fn node_type(&self, id: TemplateNodeId) -> Option<&AgentType> {
        self.nodes.get(&id)
    }

    /// Returns the number of template nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true for the empty pattern, which matches any net trivially.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (TemplateNodeId, &AgentType)> {
        self.nodes.iter().map(|(id, ty)| (*id, ty))
    }

    /// Internal wires, in insertion order (the matcher's traversal order).
    #[inline]
    pub fn wires(&self) -> &[(TemplatePort, TemplatePort)] {
        &self.wires
    }

    /// Ordered boundary ports.
    #[inline]
    pub fn boundary(&self) -> &[TemplatePort] {
        &self.boundary
    }

    /// Ordered boundary labels (the boundary signature, with the length).
    #[inline]
    pub fn labels(&self) -> &[Option<String>] {
        &self.labels
    }

    /// Validates structure: known nodes, in-range ports, every port covered
    /// exactly once by a wire or boundary slot, connectedness, root present.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.nodes.is_empty() {
            return Err(TemplateError::Empty);
        }
        let root = self.root.ok_or(TemplateError::MissingRoot)?;
        if !self.nodes.contains_key(&root) {
            return Err(TemplateError::UnknownNode(root));
        }
        check_coverage(&self.nodes, &self.wires, self.boundary.iter().copied())?;
        if !is_connected(&self.nodes, &self.wires) {
            return Err(TemplateError::NotConnected);
        }
        Ok(())
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a replacement boundary slot connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundarySpot {
    /// Not yet bound; invalid in a finished replacement.
    Unbound,
    /// The slot connects the outside wire to a port of a replacement node.
    Port(TemplatePort),
    /// The slot connects the outside wire directly to another boundary
    /// slot's outside wire. Pass-throughs come in mutual pairs.
    Passthrough(usize),
}

/// Right-hand-side template of a rule.
///
/// Boundary length is fixed at construction so positional alignment with
/// the pattern is explicit from the start; slots are then bound one by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    nodes: BTreeMap<TemplateNodeId, AgentType>,
    wires: Vec<(TemplatePort, TemplatePort)>,
    boundary: Vec<BoundarySpot>,
    labels: Vec<Option<String>>,
    next_id: u64,
}

impl Replacement {
    /// Creates a replacement with `boundary_len` unbound slots.
    pub fn new(boundary_len: usize) -> Self {
        Self {
            nodes: BTreeMap::new(),
            wires: Vec::new(),
            boundary: vec![BoundarySpot::Unbound; boundary_len],
            labels: vec![None; boundary_len],
            next_id: 0,
        }
    }

    /// Adds a typed node to instantiate at rewrite time.
    pub fn add_node(&mut self, ty: AgentType) -> TemplateNodeId {
        let id = TemplateNodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, ty);
        id
    }

    /// Adds an internal wire between two template ports.
    pub fn add_wire(&mut self, a: TemplatePort, b: TemplatePort) {
        self.wires.push((a, b));
    }

    /// Binds boundary slot `i` to a node port.
    pub fn bind_port(&mut self, i: usize, port: TemplatePort) -> Result<(), TemplateError> {
        let slot = self
            .boundary
            .get_mut(i)
            .ok_or(TemplateError::BoundaryOutOfRange(i))?;
        *slot = BoundarySpot::Port(port);
        Ok(())
    }

    /// Binds boundary slots `i` and `j` to each other (pass-through pair).
    pub fn bind_passthrough(&mut self, i: usize, j: usize) -> Result<(), TemplateError> {
        if i == j {
            return Err(TemplateError::BadPassthrough(i));
        }
        let len = self.boundary.len();
        if i >= len {
            return Err(TemplateError::BoundaryOutOfRange(i));
        }
        if j >= len {
            return Err(TemplateError::BoundaryOutOfRange(j));
        }
        self.boundary[i] = BoundarySpot::Passthrough(j);
        self.boundary[j] = BoundarySpot::Passthrough(i);
        Ok(())
    }

    /// Sets the label of boundary slot `i`.
    pub fn set_label(&mut self, i: usize, label: impl Into<String>) -> Result<(), TemplateError> {
        let slot = self
            .labels
            .get_mut(i)
            .ok_or(TemplateError::BoundaryOutOfRange(i))?;
        *slot = Some(label.into());
        Ok(())
    }

    /// Returns the type of a template node.
    #[inline]
    pub fn node_type(&self, id: TemplateNodeId) -> Option<&AgentType> {
        self.nodes.get(&id)
    }

    /// Returns the number of template nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (TemplateNodeId, &AgentType)> {
        self.nodes.iter().map(|(id, ty)| (*id, ty))
    }

    /// Internal wires, in insertion order.
    #[inline]
    pub fn wires(&self) -> &[(TemplatePort, TemplatePort)] {
        &self.wires
    }

    /// Ordered boundary slots.
    #[inline]
    pub fn boundary(&self) -> &[BoundarySpot] {
        &self.boundary
    }

    /// Ordered boundary labels.
    #[inline]
    pub fn labels(&self) -> &[Option<String>] {
        &self.labels
    }

    /// Validates structure: all slots bound, pass-throughs mutually paired,
    /// every node port covered exactly once by a wire or a `Port` slot.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for (i, slot) in self.boundary.iter().enumerate() {
            match slot {
                BoundarySpot::Unbound => return Err(TemplateError::UnboundBoundary(i)),
                BoundarySpot::Passthrough(j) => {
                    if *j >= self.boundary.len() {
                        return Err(TemplateError::BoundaryOutOfRange(*j));
                    }
                    if self.boundary[*j] != BoundarySpot::Passthrough(i) {
                        return Err(TemplateError::BadPassthrough(i));
                    }
                }
                BoundarySpot::Port(_) => {}
            }
        }
        let bound_ports = self.boundary.iter().filter_map(|slot| match slot {
            BoundarySpot::Port(p) => Some(*p),
            _ => None,
        });
        check_coverage(&self.nodes, &self.wires, bound_ports)
    }
}

/// Checks that every port of every node is covered exactly once by an
/// internal wire endpoint or a boundary binding, and that all references
/// point at known nodes with in-range indices.
fn check_coverage(
    nodes: &BTreeMap<TemplateNodeId, AgentType>,
    wires: &[(TemplatePort, TemplatePort)],
    boundary: impl Iterator<Item = TemplatePort>,
) -> Result<(), TemplateError> {
    let mut seen: HashSet<TemplatePort> = HashSet::new();
    let mut cover = |port: TemplatePort| -> Result<(), TemplateError> {
        let ty = nodes
            .get(&port.node)
            .ok_or(TemplateError::UnknownNode(port.node))?;
        if port.index > ty.arity() {
            return Err(TemplateError::PortOutOfRange(port));
        }
        if !seen.insert(port) {
            return Err(TemplateError::PortReused(port));
        }
        Ok(())
    };
    for (a, b) in wires {
        cover(*a)?;
        cover(*b)?;
    }
    for port in boundary {
        cover(port)?;
    }
    for (id, ty) in nodes {
        for index in 0..=ty.arity() {
            let port = TemplatePort::new(*id, index);
            if !seen.contains(&port) {
                return Err(TemplateError::PortUncovered(port));
            }
        }
    }
    Ok(())
}

/// Checks connectedness of the template graph over internal wires.
fn is_connected(
    nodes: &BTreeMap<TemplateNodeId, AgentType>,
    wires: &[(TemplatePort, TemplatePort)],
) -> bool {
    let Some((&start, _)) = nodes.iter().next() else {
        return true;
    };
    let mut adjacency: HashMap<TemplateNodeId, Vec<TemplateNodeId>> = HashMap::new();
    for (a, b) in wires {
        adjacency.entry(a.node).or_default().push(b.node);
        adjacency.entry(b.node).or_default().push(a.node);
    }
    let mut visited: HashSet<TemplateNodeId> = HashSet::new();
    let mut queue: VecDeque<TemplateNodeId> = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            queue.extend(next.iter().copied());
        }
    }
    visited.len() == nodes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_ty() -> AgentType {
        AgentType::new("Add", 2)
    }

    fn zero_ty() -> AgentType {
        AgentType::new("Zero", 0)
    }

    /// The `Add(Zero, y) -> y` left-hand side: an active Add-Zero pair with
    /// two boundary ports (second argument and result).
    fn add_zero_pattern() -> Pattern {
        let mut lhs = Pattern::new();
        let a = lhs.add_node(add_ty());
        let z = lhs.add_node(zero_ty());
        lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(z));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        lhs.add_boundary(TemplatePort::aux(a, 2));
        lhs
    }

    #[test]
    fn valid_pattern_passes() {
        assert_eq!(add_zero_pattern().validate(), Ok(()));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert_eq!(Pattern::new().validate(), Err(TemplateError::Empty));
    }

    #[test]
    fn uncovered_port_is_rejected() {
        let mut lhs = Pattern::new();
        let a = lhs.add_node(add_ty());
        let z = lhs.add_node(zero_ty());
        lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(z));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        // aux 2 left uncovered
        assert_eq!(
            lhs.validate(),
            Err(TemplateError::PortUncovered(TemplatePort::aux(a, 2)))
        );
    }

    #[test]
    fn reused_port_is_rejected() {
        let mut lhs = Pattern::new();
        let a = lhs.add_node(add_ty());
        let z = lhs.add_node(zero_ty());
        lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(z));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        lhs.add_boundary(TemplatePort::aux(a, 2));
        lhs.add_boundary(TemplatePort::aux(a, 1));
        assert_eq!(
            lhs.validate(),
            Err(TemplateError::PortReused(TemplatePort::aux(a, 1)))
        );
    }

    #[test]
    fn disconnected_pattern_is_rejected() {
        let mut lhs = Pattern::new();
        let z1 = lhs.add_node(zero_ty());
        let z2 = lhs.add_node(zero_ty());
        lhs.add_boundary(TemplatePort::principal(z1));
        lhs.add_boundary(TemplatePort::principal(z2));
        assert_eq!(lhs.validate(), Err(TemplateError::NotConnected));
    }

    #[test]
    fn passthrough_replacement_validates() {
        // Add(Zero, y) -> y: no nodes, outside wires joined pairwise.
        let mut rhs = Replacement::new(2);
        rhs.bind_passthrough(0, 1).unwrap();
        assert_eq!(rhs.validate(), Ok(()));
    }

    #[test]
    fn unbound_slot_is_rejected() {
        let rhs = Replacement::new(1);
        assert_eq!(rhs.validate(), Err(TemplateError::UnboundBoundary(0)));
    }

    #[test]
    fn asymmetric_passthrough_is_rejected() {
        let mut rhs = Replacement::new(3);
        rhs.bind_passthrough(0, 1).unwrap();
        // Rebind 1 to point at 2, breaking the 0 <-> 1 pair.
        rhs.boundary[1] = BoundarySpot::Passthrough(2);
        rhs.boundary[2] = BoundarySpot::Passthrough(1);
        assert_eq!(rhs.validate(), Err(TemplateError::BadPassthrough(0)));
    }

    #[test]
    fn replacement_coverage_is_checked() {
        let mut rhs = Replacement::new(1);
        let z = rhs.add_node(zero_ty());
        rhs.bind_port(0, TemplatePort::principal(z)).unwrap();
        assert_eq!(rhs.validate(), Ok(()));

        let mut incomplete = Replacement::new(0);
        let z = incomplete.add_node(zero_ty());
        assert_eq!(
            incomplete.validate(),
            Err(TemplateError::PortUncovered(TemplatePort::principal(z)))
        );
    }
}
