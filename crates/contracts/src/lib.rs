//! # Contracts
//!
//! Frozen interface contracts shared by every snir crate: the data that flows
//! through a scan and the capabilities the core consumes.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Flow
//! - `Target` → `Renderer` → `ScanResult` → `ResultSink`
//! - Configuration for every capability lives in `ScanBlueprint`

mod blueprint;
mod error;
mod renderer;
mod result;
mod sink;
mod target;

pub use blueprint::*;
pub use error::*;
pub use renderer::*;
pub use result::ScanResult;
pub use sink::*;
pub use target::{Scheme, Target};
