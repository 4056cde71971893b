// Audit Log Storage Abstraction
//
// Defines the read contract for the audit log. Implementations may
// persist to a document store, a relational table, object storage, etc.
// Writing is owned by the change-tracking listener and is not part of
// this contract.

use super::{LogEntry, LogError, ObjectClass, ObjectId, Version};

/// Which versions of an object's history to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionFilter {
    #[default]
    All,
    /// Entries with `version <= V`.
    AtOrBelow(Version),
}

impl VersionFilter {
    pub fn matches(&self, version: Version) -> bool {
        match self {
            VersionFilter::All => true,
            VersionFilter::AtOrBelow(max) => version <= *max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first. Required for folding.
    #[default]
    Ascending,
    /// Newest first. Used for history browsing.
    Descending,
}

/// A single history lookup for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub object_id: ObjectId,
    pub object_class: ObjectClass,
    pub filter: VersionFilter,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl LogQuery {
    /// All entries for the object, ascending, unpaginated.
    pub fn new(object_id: ObjectId, object_class: ObjectClass) -> Self {
        Self {
            object_id,
            object_class,
            filter: VersionFilter::All,
            order: SortOrder::Ascending,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: VersionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Page bounds. A zero limit or offset means "unset".
    pub fn page(mut self, limit: Option<usize>, offset: Option<usize>) -> Self {
        self.limit = limit.filter(|l| *l > 0);
        self.offset = offset.filter(|o| *o > 0);
        self
    }

    /// Apply offset then limit to an already filtered and ordered sequence.
    pub fn paginate<T>(&self, ordered: Vec<T>) -> Vec<T> {
        let skipped = ordered.into_iter().skip(self.offset.unwrap_or(0));
        match self.limit {
            Some(limit) => skipped.take(limit).collect(),
            None => skipped.collect(),
        }
    }
}

/// Storage backend for the audit log.
///
/// Properties required from implementations:
/// - Entries are immutable once stored
/// - Results are filtered to the queried (object id, object class)
/// - Results honour the requested version order exactly
///
/// An empty result is not an error; callers decide what it means.
pub trait LogStore: Send + Sync {
    /// List entries matching the query.
    fn list(&self, query: &LogQuery) -> Result<Vec<LogEntry>, LogError>;
}

impl<S: LogStore + ?Sized> LogStore for &S {
    fn list(&self, query: &LogQuery) -> Result<Vec<LogEntry>, LogError> {
        (**self).list(query)
    }
}
