//! Reduction traces: an auditable record of a scheduler run.
//!
//! Each recorded step names the rule that fired and carries structural
//! fingerprints of the net before and after. Because fingerprints are
//! isomorphism-invariant, a trace taken on one machine can be checked
//! against a re-reduction elsewhere even though agent ids differ. Traces
//! serialize to CBOR for storage alongside the nets they describe.
//!
//! # Citations
//! - CBOR: RFC 8949 (2020)
//! - Hash chaining: Haber & Stornetta, "How to time-stamp a digital
//!   document" (1991)

use crate::fingerprint::HashValue;
use crate::ruleset::RuleId;
use serde::{Deserialize, Serialize};

/// One recorded rewrite step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    /// The rule that fired.
    pub rule: RuleId,
    /// Its name at recording time, for human-readable reports.
    pub rule_name: String,
    /// Fingerprint of the net the rule fired on.
    pub pre: HashValue,
    /// Fingerprint of the successor net.
    pub post: HashValue,
}

/// An ordered sequence of rewrite steps from one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteTrace {
    steps: Vec<TraceStep>,
}

impl RewriteTrace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    /// The recorded steps, in reduction order.
    #[inline]
    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    /// Number of recorded steps.
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when nothing was recorded (the run started at a normal form).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks that consecutive steps chain: each step's post fingerprint is
    /// the next step's pre fingerprint. A broken chain means steps were
    /// dropped, reordered, or taken from different runs.
    pub fn verify_chain(&self) -> bool {
        self.steps
            .windows(2)
            .all(|pair| pair[0].post == pair[1].pre)
    }

    /// Serializes the trace to CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    /// Deserializes a trace from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }
}
