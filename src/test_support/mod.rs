//! Shared helpers for unit tests.

pub(crate) mod page_transport;
pub(crate) mod socket_guard;
