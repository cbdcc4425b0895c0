//! Strong typing with newtypes for domain concepts.
//!
//! Identifiers arrive on the wire as signed integers and are validated into
//! these types exactly once, by the request unpacker.

use std::fmt;

/// Caller-assigned correlation id, echoed verbatim in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(pub u64);

impl CorrelationId {
    /// Get the raw id.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Zero-based user row of the rating matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub u32);

impl UserId {
    /// Row index into the user factors.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {}", self.0)
    }
}

/// Zero-based item column of the rating matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u32);

impl ItemId {
    /// Column index into the item factors.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {}", self.0)
    }
}

/// A single (user, item) rating query. Immutable once unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Query {
    pub user: UserId,
    pub item: ItemId,
}

impl Query {
    pub fn new(user: UserId, item: ItemId) -> Self {
        Self { user, item }
    }
}

/// What the caller asked for.
///
/// Both variants carry a query because the rating is computed for probes too,
/// which keeps latency comparable across request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Plain rating prediction.
    Rating(Query),
    /// Rating prediction with host CPU counters piggybacked on the response.
    UtilizationProbe(Query),
}

impl RequestKind {
    /// The query to hand to the rating engine.
    pub fn query(&self) -> Query {
        match self {
            RequestKind::Rating(q) | RequestKind::UtilizationProbe(q) => *q,
        }
    }

    /// Whether host counters should be reported.
    pub fn is_probe(&self) -> bool {
        matches!(self, RequestKind::UtilizationProbe(_))
    }
}

/// Request after unpacking: correlation id plus the tagged request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackedRequest {
    pub id: CorrelationId,
    pub kind: RequestKind,
}
