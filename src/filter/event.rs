//! Shared EIT target-event lookup.
//!
//! The program filter and the airtime tracker both scan the EIT p/f for the
//! target event; only their reactions differ, so the lookup itself lives
//! here.

use crate::ts::{EitEvent, EitTable};

/// Where the target event stands in an EIT p/f table.
#[derive(Debug)]
pub enum EitDecision<'a> {
    /// The target is the present event; it is on air now.
    Present(&'a EitEvent),
    /// The target is the following event; it starts soon.
    Following(&'a EitEvent),
    /// The table carries no events at all.
    NoEvents,
    /// The present event is not the target and there is no following slot.
    NoFollowing,
    /// The target is in neither slot.
    NotListed,
}

/// Locate `eid` among the table's present/following events.
///
/// Callers must already have checked the table's service id.
pub fn locate_target_event(eit: &EitTable, eid: u16) -> EitDecision<'_> {
    let Some(present) = eit.events.first() else {
        return EitDecision::NoEvents;
    };
    if present.event_id == eid {
        return EitDecision::Present(present);
    }

    let Some(following) = eit.events.get(1) else {
        return EitDecision::NoFollowing;
    };
    if following.event_id == eid {
        return EitDecision::Following(following);
    }

    EitDecision::NotListed
}
