//! Conflict resolution between candidates touching the same resource.
//!
//! # Rule
//!
//! Last write wins: the candidate with the strictly later timestamp is
//! authoritative. Equal timestamps fall back to a per-type tie-break (the
//! larger assigned id for events), which makes the rule a total order. N-ary
//! input is reduced with a left fold of the pairwise rule, so the result is
//! independent of input order.
//!
//! Timestamps come from device clocks and may be skewed. The resolver does not
//! try to correct skew; it only guarantees every replica picks the same winner.

use crate::{error::Result, Error, OfflineChange, SyncEvent, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Something that can take part in last-write-wins resolution.
pub trait Resolvable {
    /// Wall-clock time of the write.
    fn timestamp(&self) -> Timestamp;

    /// Orders two candidates whose timestamps are equal. Greater wins.
    fn tiebreak_cmp(&self, other: &Self) -> Ordering;
}

impl Resolvable for SyncEvent {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn tiebreak_cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Resolvable for OfflineChange {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn tiebreak_cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T: Resolvable + ?Sized> Resolvable for &T {
    fn timestamp(&self) -> Timestamp {
        (**self).timestamp()
    }

    fn tiebreak_cmp(&self, other: &Self) -> Ordering {
        (**self).tiebreak_cmp(*other)
    }
}

/// Total order used by the resolver and the optimizer.
pub(crate) fn precedence<T: Resolvable>(a: &T, b: &T) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| a.tiebreak_cmp(b))
}

/// Pick the winner of two candidates.
pub fn resolve_pair<T: Resolvable>(a: T, b: T) -> T {
    match precedence(&b, &a) {
        Ordering::Greater => b,
        _ => a,
    }
}

/// Pick the single authoritative candidate.
///
/// Fails with [`Error::ConflictResolutionFailed`] when there is nothing to
/// choose from. A single candidate wins by default.
pub fn resolve_conflict<T, I>(candidates: I) -> Result<T>
where
    T: Resolvable,
    I: IntoIterator<Item = T>,
{
    let mut iter = candidates.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::ConflictResolutionFailed("no candidates".to_string()))?;
    Ok(iter.fold(first, resolve_pair))
}

/// Which side of a local-versus-server disagreement is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    /// The queued offline change should be applied
    Local,
    /// The stored server event stands; the queued change is superseded
    Server,
}

/// A queued change and a stored event competing for the same resource.
enum Contender<'a> {
    Local(&'a OfflineChange),
    Server(&'a SyncEvent),
}

impl Contender<'_> {
    fn rank(&self) -> u8 {
        match self {
            Contender::Local(_) => 0,
            Contender::Server(_) => 1,
        }
    }

    fn device_id(&self) -> &str {
        match self {
            Contender::Local(change) => &change.device_id,
            Contender::Server(event) => &event.device_id,
        }
    }
}

impl Resolvable for Contender<'_> {
    fn timestamp(&self) -> Timestamp {
        match self {
            Contender::Local(change) => change.timestamp,
            Contender::Server(event) => event.timestamp,
        }
    }

    // The server side wins an exact timestamp tie, unless the stored event
    // came from the same device: it is then an earlier edit of that device,
    // replayed before the queued change, and the queued change follows it.
    fn tiebreak_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Contender::Local(a), Contender::Local(b)) => a.tiebreak_cmp(b),
            (Contender::Server(a), Contender::Server(b)) => a.tiebreak_cmp(b),
            _ if self.device_id() == other.device_id() => other.rank().cmp(&self.rank()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Decide between a queued offline change and the latest stored event for
/// the same resource.
pub fn arbitrate(change: &OfflineChange, event: &SyncEvent) -> Authority {
    match resolve_pair(Contender::Local(change), Contender::Server(event)) {
        Contender::Local(_) => Authority::Local,
        Contender::Server(_) => Authority::Server,
    }
}
