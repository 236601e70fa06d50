//! # farmgate
//!
//! Session bootstrap and route guard for the farming-game client.
//!
//! On startup the client decides whether it still holds a valid bearer
//! credential, resolves the signed-in user and their linked player record,
//! and gates protected screens on that answer. The remote game API is a
//! black box reached over HTTP.
//!
//! DESIGN
//! ======
//! - [`session::SessionManager`] is the single writer of session state and is
//!   injected by `Arc` into everything that reads it.
//! - [`guard`] turns a session snapshot into `Loading` / `Redirect` / `Render`.
//! - [`signal`] carries out-of-band invalidation from the API layer to the
//!   session over an explicit channel.
//! - [`player`] and [`cache`] hold the pass-through player data calls and
//!   their typed query cache.

pub mod cache;
pub mod config;
pub mod guard;
pub mod net;
pub mod player;
pub mod session;
pub mod signal;
pub mod storage;
pub mod view;
