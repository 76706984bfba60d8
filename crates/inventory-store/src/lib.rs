//! The local device store: the single source of truth for imported devices in a session.
//!
//! Layers, innermost first:
//! - [`DeviceCollection`]: plain state plus [`Action`] transitions, no side effects
//! - [`Persisted`]: serializes every new state to the durable medium through a `PersistWriter`
//! - [`History`]: bounded undo/redo of full collection snapshots
//!
//! [`DeviceStore`] owns the stack together with the transient session state (selection,
//! loading flag, import progress) and notifies subscribers after each action.

mod config;
mod error;
mod event;
mod history;
mod persist;
mod state;
mod store;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use event::{BatchFailure, BatchSummary, ImportProgress, StoreEvent, SubscriptionId};
pub use history::{History, DEFAULT_HISTORY_LIMIT};
pub use persist::{decode_state, encode_state, rehydrate, DecodeError, Persisted, PERSIST_VERSION};
pub use state::{Action, DeviceCollection, Effect, StateCore};
pub use store::{DeviceStore, SharedDeviceStore};
