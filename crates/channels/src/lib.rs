//! Remote channel gateway abstraction.
//!
//! The chat platform is reached through [`RemoteGateway`]: list, fetch,
//! create, edit and delete managed items (messages) at a [`Target`]. Every
//! call is asynchronous, rate-limited upstream and may fail; failures are
//! classified by [`Error`] so callers can tell a vanished item from a
//! transient outage.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod target;

pub use {
    error::{Error, ErrorKind, Result},
    gateway::{ItemId, RemoteGateway, RemoteItem},
    target::Target,
};
