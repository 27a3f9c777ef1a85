//! Renderer trait - the external page-rendering capability
//!
//! The core never navigates pages itself. Workers hand allowed targets to a
//! `Renderer` and forward whatever comes back.

use crate::{RenderError, ScanResult, Target};

/// Page rendering capability
///
/// Shared by every worker of a dispatcher, so methods take `&self`.
/// Implementations doing blocking I/O should move it off the async runtime.
#[trait_variant::make(Renderer: Send)]
pub trait LocalRenderer {
    /// Renderer name (used for logging)
    fn name(&self) -> &str;

    /// Render a target that already passed admission
    ///
    /// # Errors
    /// Returns `RenderError`; the dispatcher records it as a failed result.
    async fn render(&self, target: &Target) -> Result<ScanResult, RenderError>;

    /// Release renderer resources
    async fn close(&self);
}
