//! Administrative HTTP surface.
//!
//! A small JSON API for poking at live entities by hand and reading loop
//! statistics. Requests are thin pass-throughs to the collaborator traits.

pub mod routes;
pub mod server;

pub use routes::Route;
pub use server::{AdminServer, AdminServerError, AdminState};
