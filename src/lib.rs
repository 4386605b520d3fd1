//! Community game voting over a hosted realtime database.
//!
//! ARCHITECTURE
//! ============
//! [`client::VoteClient`] is the state manager: it seeds the two fixed
//! entries, mirrors the collection from a [`store::RealtimeStore`], submits
//! community entries, and moves this device's single vote through an
//! optimistic transaction. The device's vote identity lives in an injected
//! [`identity::LocalStorage`]. [`view`] turns the mirrored state into what a
//! board displays.

pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod identity;
pub mod state;
pub mod store;
pub mod view;
pub mod vote;
