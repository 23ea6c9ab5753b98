//! Pure attendance logic: distance, geofence resolution and daily summaries.
//!
//! Nothing in here touches the database or the network. Handlers fetch the
//! data, hand it over, and render whatever comes back.

pub mod geo;
pub mod geofence;
pub mod summary;
