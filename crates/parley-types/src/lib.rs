//! Wire types shared by the HTTP API and its clients.

pub mod api;
