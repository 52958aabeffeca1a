//! Process-local signaling: a room-keyed store of offer/answer records and
//! a watch task that replays them to the negotiation layer.
//!
//! This stands in for a real signaling channel. It only works while both
//! peers talk to the same process; the watch contract (full records,
//! possibly redundant callbacks) is what a broker-backed replacement would
//! keep.

pub mod store;
pub mod watch;
