//! Database module: view models, playlist repository and the sync ledger.
//!
//! - `model`: input and view structs passed to and from the SQL functions.
//! - `repo`: pool setup plus playlist, song and song-identity queries.
//! - `ledger`: the per-(playlist, platform) sync row and its audit log.
//!
//! Callers import from `playlist_sync::db`; both SQL modules are re-exported.

pub mod ledger;
pub mod model;
pub mod repo;

pub use ledger::*;
pub use repo::*;

pub use model::{NewPlaylist, NewSong, NewSyncLog};
