use crate::{error::LifelineResult, session::PlaybackMode};

/// One rasterized frame: straight or premultiplied RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl FrameRgba {
    /// Allocate a frame filled with a single straight-alpha color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
            premultiplied: false,
        }
    }

    /// Straight-alpha RGBA of the pixel at `(x, y)`; the caller guarantees
    /// bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// The opaque "current visual" producer consumed by frame capture and the
/// export controller.
///
/// The controller drives implementations through a fixed sequence: apply a
/// view state, optionally expand the layout for capture, wait for the change
/// to settle, then rasterize. Layout expansion is a temporary override owned
/// exclusively by the in-progress export and must be reverted via
/// [`restore_layout`](CaptureSurface::restore_layout) before control returns
/// to normal use.
pub trait CaptureSurface {
    /// Apply the playback state the next rasterization should reflect.
    fn set_view(&mut self, mode: PlaybackMode, step: i32);

    /// Switch to an unclipped, margin-free layout so captures contain the
    /// full content. Reverted by [`restore_layout`](CaptureSurface::restore_layout).
    fn expand_layout(&mut self);

    /// Revert any layout override applied by
    /// [`expand_layout`](CaptureSurface::expand_layout).
    fn restore_layout(&mut self);

    /// Block until pending view/layout changes are visually in effect.
    ///
    /// Surfaces that render synchronously acknowledge immediately. A surface
    /// wrapping an asynchronous pipeline with no completion signal should
    /// wait a bounded settle delay here instead; the controller calls this at
    /// every point the capture sequence depends on settled output.
    fn settle(&mut self) -> LifelineResult<()> {
        Ok(())
    }

    /// Rasterize the current visual state at the capture pixel density,
    /// omitting export-excluded elements.
    ///
    /// `Ok(None)` means the drawing context is unavailable ("frame
    /// unavailable"): recoverable for sequence export, fatal for single-image
    /// export. Errors are reserved for non-recoverable failures.
    fn rasterize(&mut self) -> LifelineResult<Option<FrameRgba>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_frame_repeats_color() {
        let frame = FrameRgba::solid(3, 2, [5, 10, 20, 255]);
        assert_eq!(frame.data.len(), 3 * 2 * 4);
        assert_eq!(frame.pixel(0, 0), [5, 10, 20, 255]);
        assert_eq!(frame.pixel(2, 1), [5, 10, 20, 255]);
    }
}
