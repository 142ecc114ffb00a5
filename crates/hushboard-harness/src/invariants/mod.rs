//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during system execution.
//! Unlike example-based tests that check specific scenarios, invariants
//! verify behavioral properties across all possible execution paths.
//!
//! # Architecture
//!
//! Tests record every published [`StatusSnapshot`] into a [`StatusTrace`],
//! then run registered [`Invariant`] checks against it. Most checks look at
//! each snapshot on its own; some compare consecutive snapshots.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let mut trace = StatusTrace::new();
//! trace.record(orchestrator.snapshot());
//! registry.check_all(&trace)?;
//! ```

mod checks;

use hushboard_app::StatusSnapshot;

pub use checks::{
    DecryptedSubsetOfReceived, DeployedMatchesNetwork, DisconnectedIsEmpty, EpochMonotonicity,
    FlagsMatchGuards, SentIdsUnique,
};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Ordered record of published status snapshots.
#[derive(Debug, Clone, Default)]
pub struct StatusTrace {
    snapshots: Vec<StatusSnapshot>,
}

impl StatusTrace {
    /// Create an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot.
    pub fn record(&mut self, snapshot: StatusSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Every snapshot, oldest first.
    pub fn snapshots(&self) -> &[StatusSnapshot] {
        &self.snapshots
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> Option<&StatusSnapshot> {
        self.snapshots.last()
    }

    /// Number of recorded snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// An invariant that can be checked against recorded status.
///
/// Invariants are behavioral properties that must always hold.
/// They capture WHAT must be true, not specific test scenarios.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the trace.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, trace: &StatusTrace) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Collects multiple invariants and runs them all against a trace.
/// Use [`InvariantRegistry::standard()`] for the orchestrator invariants.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the orchestrator invariants.
    ///
    /// Includes:
    /// - [`DecryptedSubsetOfReceived`]: only received messages are decrypted
    /// - [`SentIdsUnique`]: the sent list has no duplicates
    /// - [`FlagsMatchGuards`]: `can_*` flags agree with in-flight guards
    /// - [`DisconnectedIsEmpty`]: no lists or guards without a session
    /// - [`DeployedMatchesNetwork`]: `is_deployed` agrees with network status
    /// - [`EpochMonotonicity`]: session epochs never decrease
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(DecryptedSubsetOfReceived);
        registry.add(SentIdsUnique);
        registry.add(FlagsMatchGuards);
        registry.add(DisconnectedIsEmpty);
        registry.add(DeployedMatchesNetwork);
        registry.add(EpochMonotonicity);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given trace.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, trace: &StatusTrace) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(trace).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking on any violation.
    ///
    /// Use this in tests where you want immediate failure with context.
    #[allow(clippy::panic, reason = "Test assertion helper")]
    pub fn assert_all(&self, trace: &StatusTrace, context: &str) {
        if let Err(violations) = self.check_all(trace) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
