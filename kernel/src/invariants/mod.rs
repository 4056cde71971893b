// Fold Invariant Framework
//
// Invariants are pure rules checked against each log entry *before*
// it is folded into the reconstructed state. A violation stops the
// fold so a corrupt history never reaches a live object.

use crate::log::LogEntry;
use crate::state::ReconstructedState;

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all fold invariants.
///
/// Invariants must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, state: &ReconstructedState, entry: &LogEntry) -> InvariantResult;
}

/// Entries must arrive in strictly ascending version order.
pub struct AscendingVersions;

impl Invariant for AscendingVersions {
    fn name(&self) -> &'static str {
        "ascending-versions"
    }

    fn validate(&self, state: &ReconstructedState, entry: &LogEntry) -> InvariantResult {
        if entry.version > state.version() {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail(format!(
                "version {} folded after version {}",
                entry.version,
                state.version()
            ))
        }
    }
}

/// Entries must belong to the object being reconstructed.
pub struct SameObject;

impl Invariant for SameObject {
    fn name(&self) -> &'static str {
        "same-object"
    }

    fn validate(&self, state: &ReconstructedState, entry: &LogEntry) -> InvariantResult {
        if entry.belongs_to(state.object_id(), state.object_class()) {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail(format!(
                "entry for {}#{} folded into {}#{}",
                entry.object_class,
                entry.object_id,
                state.object_class(),
                state.object_id()
            ))
        }
    }
}

/// Invariant engine that evaluates a set of invariants.
#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    /// Create an engine with no invariants.
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Engine with the invariants every fold must respect.
    pub fn standard() -> Self {
        let mut engine = Self::new();
        engine.register(AscendingVersions);
        engine.register(SameObject);
        engine
    }

    /// Register an invariant.
    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(
        &self,
        state: &ReconstructedState,
        entry: &LogEntry,
    ) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            match invariant.validate(state, entry) {
                InvariantResult::Pass => continue,
                InvariantResult::Fail(reason) => {
                    return Err(InvariantViolation {
                        invariant: invariant.name(),
                        reason,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Returned when an invariant is violated.
#[derive(Debug, thiserror::Error)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{FieldDiff, ObjectClass, ObjectId};

    struct NoRemovals;

    impl Invariant for NoRemovals {
        fn name(&self) -> &'static str {
            "no-removals"
        }

        fn validate(&self, _state: &ReconstructedState, entry: &LogEntry) -> InvariantResult {
            if entry.action == crate::log::LogAction::Remove {
                InvariantResult::Fail("history contains a removal".into())
            } else {
                InvariantResult::Pass
            }
        }
    }

    fn state() -> ReconstructedState {
        ReconstructedState::new(ObjectId::new("a1"), ObjectClass::new("Article"))
    }

    fn entry(id: &str, version: u64) -> LogEntry {
        LogEntry::new(ObjectId::new(id), ObjectClass::new("Article"), version, FieldDiff::new())
    }

    #[test]
    fn standard_engine_accepts_first_entry() {
        let engine = InvariantEngine::standard();
        engine.evaluate(&state(), &entry("a1", 1)).unwrap();
    }

    #[test]
    fn stale_version_is_rejected() {
        let engine = InvariantEngine::standard();
        let mut s = state();
        s.apply(&entry("a1", 3), |_| Ok(false)).unwrap();

        let err = engine.evaluate(&s, &entry("a1", 2)).unwrap_err();
        assert_eq!(err.invariant, "ascending-versions");
        assert!(err.to_string().contains("version 2 folded after version 3"));
    }

    #[test]
    fn foreign_entry_is_rejected() {
        let engine = InvariantEngine::standard();
        let err = engine.evaluate(&state(), &entry("b2", 1)).unwrap_err();
        assert_eq!(err.invariant, "same-object");
    }

    #[test]
    fn custom_invariant_blocks_fold() {
        let mut engine = InvariantEngine::new();
        engine.register(NoRemovals);

        let removal = entry("a1", 1).with_action(crate::log::LogAction::Remove);
        let err = engine.evaluate(&state(), &removal).unwrap_err();

        assert!(err.to_string().contains("no-removals"));
    }
}
