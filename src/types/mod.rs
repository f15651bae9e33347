//! Types that are used across multiple components of rendezvous-rs.
//!
//! Types specific to a single component, e.g. the intents exchanged by the rendezvous state machine,
//! can be found in the "types" or "messages" submodules of that component, e.g.,
//! [`crate::rendezvous::types`].

pub mod basic;

pub mod territory;

pub mod meeting;
