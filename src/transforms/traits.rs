use crate::{error::Result, video::types::Frame};

/// Core trait implemented by every per-frame transform
pub trait Transform: Send + Sync {
    /// Returns the unique name of this transform
    fn name(&self) -> &str;

    /// Apply the transform to a frame
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame to modify. Implementations may swap the pixel buffer
    ///   (e.g. resize or add an alpha channel) but must keep the source index.
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` on success, or an error describing why this frame could not be processed.
    fn apply(&self, frame: &mut Frame) -> Result<()>;

    /// Check frame-independent parameters before any frame is touched
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the transform would leave a `width` x `height` frame untouched
    fn is_noop_for(&self, width: u32, height: u32) -> bool {
        let _ = (width, height);
        false
    }
}
