//! Input/output helpers.
//!
//! - campaign TOML loading (`campaign`)
//! - namelist copy-then-edit (`patch`) and the edit sets / names (`namelist`)
//! - simulator track ingest (`track`)
//! - JSON run summary (`export`)

pub mod campaign;
pub mod export;
pub mod namelist;
pub mod patch;
pub mod track;

pub use campaign::*;
pub use export::*;
pub use track::*;
