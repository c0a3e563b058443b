//! Contracts for the collaborators the simulation draws through and signals to.
//!
//! All coordinates handed to a [`Canvas`] are logical pixels; the canvas is
//! scaled once by the device pixel ratio when the surface is acquired.

use crate::color::Rgba;
use crate::error::{InitError, RenderError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    SourceOver,
    /// Additive ("lighter"): overlapping glows accumulate brightness.
    Lighter,
}

/// 2D drawing context owned by a surface.
pub trait Canvas {
    fn scale(&mut self, factor: f32);
    fn clear(&mut self, width: f32, height: f32);
    fn set_blend_mode(&mut self, mode: BlendMode);
    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Rgba);
    fn stroke_segment(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba);
    fn fill_glyph(&mut self, x: f32, y: f32, glyph: char, size: f32, color: Rgba);
    /// Hands the finished frame to the display.
    fn present(&mut self) -> Result<(), RenderError>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceMetrics {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl SurfaceMetrics {
    pub fn validate(self) -> Result<Self, InitError> {
        let usable = |v: f32| v.is_finite() && v > 0.0;
        if usable(self.width) && usable(self.height) && usable(self.pixel_ratio) {
            Ok(self)
        } else {
            Err(InitError::InvalidMetrics {
                width: self.width,
                height: self.height,
                pixel_ratio: self.pixel_ratio,
            })
        }
    }
}

pub struct Surface<C> {
    pub canvas: C,
    pub metrics: SurfaceMetrics,
}

/// Supplies drawing surfaces. `acquire` is the one-shot handshake done before
/// the first frame and again on recovery.
pub trait SurfaceProvider {
    type Canvas: Canvas;

    fn acquire(&mut self) -> Result<Surface<Self::Canvas>, InitError>;
}

/// Fire-and-forget sound cues. Every method defaults to doing nothing.
pub trait AudioSink {
    fn play_launch(&mut self) {}
    fn play_explosion(&mut self) {}
    fn play_whistle(&mut self) {}
    fn play_fuse_loop(&mut self) {}
    fn stop_fuse_loop(&mut self) {}
    fn set_master_volume(&mut self, _volume: f32) {}
}

/// Canvas that discards everything, for running the simulation without a display.
#[derive(Debug, Default)]
pub struct NullCanvas;

impl Canvas for NullCanvas {
    fn scale(&mut self, _factor: f32) {}
    fn clear(&mut self, _width: f32, _height: f32) {}
    fn set_blend_mode(&mut self, _mode: BlendMode) {}
    fn fill_circle(&mut self, _x: f32, _y: f32, _radius: f32, _color: Rgba) {}
    fn stroke_segment(&mut self, _from: (f32, f32), _to: (f32, f32), _width: f32, _color: Rgba) {}
    fn fill_glyph(&mut self, _x: f32, _y: f32, _glyph: char, _size: f32, _color: Rgba) {}

    fn present(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Fixed-size provider backed by [`NullCanvas`].
#[derive(Clone, Copy, Debug)]
pub struct Headless {
    pub metrics: SurfaceMetrics,
}

impl Headless {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            metrics: SurfaceMetrics {
                width,
                height,
                pixel_ratio: 1.0,
            },
        }
    }
}

impl SurfaceProvider for Headless {
    type Canvas = NullCanvas;

    fn acquire(&mut self) -> Result<Surface<NullCanvas>, InitError> {
        Ok(Surface {
            canvas: NullCanvas,
            metrics: self.metrics.validate()?,
        })
    }
}
