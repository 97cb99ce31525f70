//! Headless Emberdelve client.
//!
//! [`SessionMirror`] turns server messages into a local view and vets
//! outgoing requests; [`ClientNet`] carries both over renet. A UI or bot
//! sits on top and only ever talks to these two.

mod mirror;
mod net;

pub use crate::mirror::*;
pub use crate::net::*;
