// Deterministic Diff Replay
//
// Folds an ascending sequence of log entries into a reconstructed
// state while enforcing fold invariants.

use crate::invariants::InvariantEngine;
use crate::log::{LogEntry, ObjectClass, ObjectId};
use crate::schema::CollaboratorError;
use crate::state::{FoldError, ReconstructedState};

/// Replay `entries` and derive the cumulative state of one object.
///
/// Entries must be in ascending version order; the caller's invariants
/// decide what happens otherwise (the standard set rejects it).
pub fn fold_entries<'a, I, F>(
    object_id: ObjectId,
    object_class: ObjectClass,
    entries: I,
    invariants: &InvariantEngine,
    mut is_collection: F,
) -> Result<ReconstructedState, FoldError>
where
    I: IntoIterator<Item = &'a LogEntry>,
    F: FnMut(&str) -> Result<bool, CollaboratorError>,
{
    let mut state = ReconstructedState::new(object_id, object_class);

    for entry in entries {
        // Enforce invariants before the entry touches the state
        invariants.evaluate(&state, entry)?;

        tracing::debug!(
            version = entry.version,
            fields = entry.data.len(),
            "folding log entry"
        );
        state.apply(entry, &mut is_collection)?;
    }

    Ok(state)
}
