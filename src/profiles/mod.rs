//! Server Profiles
//!
//! Named server entries persisted as YAML:
//!
//! ```yaml
//! servers:
//!   - name: local
//!     address: 127.0.0.1:11211
//!     default: true
//!   - name: staging
//!     address: 10.0.0.5:11211
//! last_used: staging
//! ```
//!
//! [`ProfileSet`] holds the consistency rules (unique names, one default,
//! never empty). [`ProfileStore`] maps each operation onto a
//! load-mutate-save cycle against the file.

mod profile;
mod store;

pub use profile::{ProfileSet, ServerProfile, DEFAULT_PROFILE_ADDRESS, DEFAULT_PROFILE_NAME};
pub use store::ProfileStore;
