//! portweave: an interaction-net rewriting engine.
//!
//! Nets are graphs of typed agents whose numbered ports are joined by
//! undirected wires; port 0 of every agent is its principal port. Rules
//! pair a connected left-hand-side pattern with a boundary-aligned
//! replacement; the matcher embeds patterns into nets, the rewriter splices
//! replacements over matched redexes, and the scheduler drives the loop to
//! normal form under a priority-ordered rule set. Rule-set analysis
//! enumerates critical pairs and tests local confluence by reducing each
//! overlap along both orders.
//!
//! Nets are linear values: every mutating operation consumes its net and
//! returns the successor, so a superseded net cannot be touched again.
//!
//! # Example
//! ```
//! use portweave::{AgentType, Net, Port};
//!
//! let (net, a) = Net::new().add_agent(AgentType::new("A", 0));
//! let (net, b) = net.add_agent(AgentType::new("B", 0));
//! let net = net.connect(Port::principal(a), Port::principal(b)).unwrap();
//! assert!(net.is_well_formed());
//! ```
//!
//! # Citations
//! - Lafont, "Interaction nets", POPL (1990)
//! - Fernández & Mackie, "A calculus for interaction nets" (1999)
//! - Knuth & Bendix, "Simple word problems in universal algebras" (1970)

#![warn(missing_docs)]

pub mod core;
pub mod fingerprint;
pub mod matcher;
pub mod pattern;
pub mod rewrite;
pub mod ruleset;
pub mod trace;
pub mod transform;

pub use crate::core::{Agent, AgentId, AgentType, Net, NetError, NetOpError, Port};
pub use crate::fingerprint::{isomorphic, net_fingerprint, wl_refinement, HashValue};
pub use crate::matcher::{find_all_matches, find_match, Match, Matches};
pub use crate::pattern::{
    BoundarySpot, Pattern, Replacement, TemplateError, TemplateNodeId, TemplatePort,
};
pub use crate::rewrite::{apply, RewriteError, RewriteOpError};
pub use crate::ruleset::{
    compose_rules, CriticalPair, IoPolicy, NoIo, Rule, RuleError, RuleId, RuleSet,
};
pub use crate::trace::{RewriteTrace, TraceStep};
pub use crate::transform::{
    step, transform, transform_traced, Normalization, StepResult, TerminationReason,
};

/// One-stop import for programs driving the engine.
pub mod prelude {
    pub use crate::core::{AgentType, Net, Port};
    pub use crate::matcher::{find_all_matches, find_match};
    pub use crate::pattern::{Pattern, Replacement, TemplatePort};
    pub use crate::ruleset::{NoIo, Rule, RuleSet};
    pub use crate::transform::{step, transform, StepResult, TerminationReason};
}
