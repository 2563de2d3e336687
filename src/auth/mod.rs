//! Backend boundary client
//!
//! Login, cookie verification and interview creation against the
//! interview backend's REST API. The session only needs the identity that
//! `create_interview` hands back.

mod client;

pub use client::{BackendClient, ACCESS_COOKIE};
