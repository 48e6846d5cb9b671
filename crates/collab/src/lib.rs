//! `codehive-collab` — real-time workspace collaboration.
//!
//! A [`CollabHub`] keeps per-workspace rooms of live connections and relays
//! edit and presence events between them. Transport is someone else's
//! problem: connections hand the hub a channel sender and the hub pushes
//! [`ServerEvent`]s into it.

pub mod events;
pub mod hub;

pub use events::{ClientEvent, ServerEvent};
pub use hub::CollabHub;
