//! Terminal display: every terminal cell holds two vertically stacked pixels
//! drawn with a lower half block, background colour for the top pixel and
//! foreground colour for the bottom one.

use std::io::{BufWriter, Stdout, Write, stdout};

use crossterm::terminal;

use crate::color::Rgba;
use crate::error::{InitError, RenderError};
use crate::math::distance;
use crate::surface::{BlendMode, Canvas, Surface, SurfaceMetrics, SurfaceProvider};

/// Logical pixels per terminal pixel. The simulation sees a display this many
/// times larger than the cell grid and the canvas scales it back down.
pub const CELL_SCALE: f32 = 4.0;
const MIN_COVERAGE: f32 = 0.25;
const VISIBLE: f32 = 0.02;

/// Rasterises canvas calls into a light buffer and writes it out as 24-bit ANSI.
pub struct TerminalCanvas<W: Write> {
    out: W,
    cols: usize,
    rows: usize,
    bg: (u8, u8, u8),
    scale: f32,
    blend: BlendMode,
    // rgb light per pixel, cols * rows * 2 entries
    light: Vec<[f32; 3]>,
    glyphs: Vec<Option<(char, (u8, u8, u8))>>,
    output_buf: Vec<u8>,
}

impl<W: Write> TerminalCanvas<W> {
    pub fn new(out: W, cols: usize, rows: usize, bg: (u8, u8, u8)) -> Self {
        Self {
            out,
            cols,
            rows,
            bg,
            scale: 1.0,
            blend: BlendMode::SourceOver,
            light: vec![[0.0; 3]; cols * rows * 2],
            glyphs: vec![None; cols * rows],
            output_buf: Vec::with_capacity(cols * rows * 24),
        }
    }

    fn pixel_height(&self) -> usize {
        self.rows * 2
    }

    fn deposit(&mut self, px: isize, py: isize, color: Rgba, coverage: f32) {
        if px < 0 || py < 0 || px as usize >= self.cols || py as usize >= self.pixel_height() {
            return;
        }
        let strength = (color.a * coverage).clamp(0.0, 1.0);
        if strength <= 0.0 {
            return;
        }
        let pixel = &mut self.light[py as usize * self.cols + px as usize];
        let rgb = [color.r, color.g, color.b];
        for (channel, value) in pixel.iter_mut().zip(rgb) {
            *channel = match self.blend {
                BlendMode::Lighter => *channel + value * strength,
                BlendMode::SourceOver => *channel * (1.0 - strength) + value * strength,
            };
        }
    }

    /// Encodes the current buffer without writing it anywhere.
    fn encode(&mut self) -> std::io::Result<()> {
        self.output_buf.clear();
        self.output_buf.extend_from_slice(b"\x1b[H");

        let mut prev_bg: Option<(u8, u8, u8)> = None;
        let mut prev_fg: Option<(u8, u8, u8)> = None;

        for row in 0..self.rows {
            let mut col = 0;
            while col < self.cols {
                let top = self.shade(self.light[row * 2 * self.cols + col]);
                let bottom = self.shade(self.light[(row * 2 + 1) * self.cols + col]);

                if let Some((glyph, fg)) = self.glyphs[row * self.cols + col] {
                    let width = if is_wide(glyph) { 2 } else { 1 };
                    if col + width <= self.cols {
                        write!(self.output_buf, "\x1b[48;2;{};{};{}m", top.0, top.1, top.2)?;
                        write!(self.output_buf, "\x1b[38;2;{};{};{}m", fg.0, fg.1, fg.2)?;
                        write!(self.output_buf, "{glyph}")?;
                        prev_bg = Some(top);
                        prev_fg = Some(fg);
                        col += width;
                        continue;
                    }
                }

                if prev_bg != Some(top) {
                    write!(self.output_buf, "\x1b[48;2;{};{};{}m", top.0, top.1, top.2)?;
                    prev_bg = Some(top);
                }
                if prev_fg != Some(bottom) {
                    write!(self.output_buf, "\x1b[38;2;{};{};{}m", bottom.0, bottom.1, bottom.2)?;
                    prev_fg = Some(bottom);
                }
                self.output_buf.extend_from_slice("▄".as_bytes());
                col += 1;
            }

            self.output_buf.extend_from_slice(b"\x1b[0m");
            prev_bg = None;
            prev_fg = None;
            if row + 1 < self.rows {
                self.output_buf.extend_from_slice(b"\r\n");
            }
        }
        Ok(())
    }

    /// Light on top of the background colour.
    fn shade(&self, light: [f32; 3]) -> (u8, u8, u8) {
        let [r, g, b] = light;
        if r.max(g).max(b) < VISIBLE {
            return self.bg;
        }
        let channel = |bg: u8, value: f32| (bg as f32 + value.clamp(0.0, 1.0) * 255.0).min(255.0) as u8;
        (channel(self.bg.0, r), channel(self.bg.1, g), channel(self.bg.2, b))
    }
}

fn is_wide(glyph: char) -> bool {
    matches!(glyph as u32,
        0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFE30..=0xFE4F | 0xFF00..=0xFF60 | 0xFFE0..=0xFFE6 | 0x1F300..=0x1FAFF | 0x20000..=0x3FFFD)
}

fn segment_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    distance(p.0, p.1, a.0 + dx * t, a.1 + dy * t)
}

impl<W: Write> Canvas for TerminalCanvas<W> {
    fn scale(&mut self, factor: f32) {
        self.scale *= factor;
    }

    fn clear(&mut self, _width: f32, _height: f32) {
        self.light.fill([0.0; 3]);
        self.glyphs.fill(None);
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Rgba) {
        let (cx, cy, r) = (x * self.scale, y * self.scale, radius * self.scale);
        if !(cx.is_finite() && cy.is_finite() && r.is_finite()) {
            return;
        }
        if r < 0.5 {
            // sub-pixel: dim the single pixel instead of dropping it
            self.deposit(cx.floor() as isize, cy.floor() as isize, color, (r * 2.0).max(MIN_COVERAGE));
            return;
        }
        let (x0, x1) = ((cx - r).floor() as isize, (cx + r).ceil() as isize);
        let (y0, y1) = ((cy - r).floor() as isize, (cy + r).ceil() as isize);
        for py in y0..=y1 {
            for px in x0..=x1 {
                let d = distance(px as f32 + 0.5, py as f32 + 0.5, cx, cy);
                let coverage = (r + 0.5 - d).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.deposit(px, py, color, coverage);
                }
            }
        }
    }

    fn stroke_segment(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba) {
        let a = (from.0 * self.scale, from.1 * self.scale);
        let b = (to.0 * self.scale, to.1 * self.scale);
        let half = (width * self.scale / 2.0).max(0.25);
        if ![a.0, a.1, b.0, b.1, half].iter().all(|v| v.is_finite()) {
            return;
        }
        let thin = (half * 2.0).clamp(MIN_COVERAGE, 1.0);
        let (x0, x1) = ((a.0.min(b.0) - half).floor() as isize, (a.0.max(b.0) + half).ceil() as isize);
        let (y0, y1) = ((a.1.min(b.1) - half).floor() as isize, (a.1.max(b.1) + half).ceil() as isize);
        for py in y0..=y1 {
            for px in x0..=x1 {
                let d = segment_distance((px as f32 + 0.5, py as f32 + 0.5), a, b);
                let coverage = (half + 0.5 - d).clamp(0.0, 1.0) * thin;
                if coverage > 0.0 {
                    self.deposit(px, py, color, coverage);
                }
            }
        }
    }

    fn fill_glyph(&mut self, x: f32, y: f32, glyph: char, _size: f32, color: Rgba) {
        let (px, py) = (x * self.scale, y * self.scale);
        if !(px.is_finite() && py.is_finite()) || px < 0.0 || py < 0.0 {
            return;
        }
        let (col, row) = (px as usize, py as usize / 2);
        if col < self.cols && row < self.rows {
            let faded = Rgba::new(color.r * color.a, color.g * color.a, color.b * color.a, 1.0);
            self.glyphs[row * self.cols + col] = Some((glyph, faded.to_u8()));
        }
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.encode()?;
        self.out.write_all(&self.output_buf)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Hands out canvases sized to the current terminal.
#[derive(Clone, Copy, Debug)]
pub struct TerminalSurface {
    bg: (u8, u8, u8),
}

impl TerminalSurface {
    pub fn new(bg: (u8, u8, u8)) -> Self {
        Self { bg }
    }

    /// Logical surface for a `cols` x `rows` grid.
    pub fn metrics_for(cols: u16, rows: u16) -> SurfaceMetrics {
        SurfaceMetrics {
            width: cols as f32 * CELL_SCALE,
            height: rows as f32 * 2.0 * CELL_SCALE,
            pixel_ratio: 1.0 / CELL_SCALE,
        }
    }
}

impl SurfaceProvider for TerminalSurface {
    type Canvas = TerminalCanvas<BufWriter<Stdout>>;

    fn acquire(&mut self) -> Result<Surface<Self::Canvas>, InitError> {
        let (cols, rows) = terminal::size()?;
        if cols == 0 || rows == 0 {
            return Err(InitError::NoSurface(format!("terminal reports {cols}x{rows} cells")));
        }
        let metrics = Self::metrics_for(cols, rows).validate()?;
        let out = BufWriter::with_capacity(1024 * 64, stdout());
        Ok(Surface {
            canvas: TerminalCanvas::new(out, cols as usize, rows as usize, self.bg),
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(cols: usize, rows: usize) -> TerminalCanvas<Vec<u8>> {
        TerminalCanvas::new(Vec::new(), cols, rows, (0, 0, 0))
    }

    #[test]
    fn additive_blend_accumulates() {
        let mut c = canvas(4, 2);
        c.set_blend_mode(BlendMode::Lighter);
        c.fill_circle(1.5, 1.5, 0.6, Rgba::new(0.4, 0.0, 0.0, 1.0));
        let once = c.light[c.cols + 1][0];
        c.fill_circle(1.5, 1.5, 0.6, Rgba::new(0.4, 0.0, 0.0, 1.0));
        assert!(c.light[c.cols + 1][0] > once);
    }

    #[test]
    fn source_over_replaces() {
        let mut c = canvas(4, 2);
        c.fill_circle(1.5, 1.5, 0.6, Rgba::new(0.4, 0.0, 0.0, 1.0));
        c.fill_circle(1.5, 1.5, 0.6, Rgba::new(0.4, 0.0, 0.0, 1.0));
        assert_eq!(c.light[c.cols + 1][0], 0.4);
    }

    #[test]
    fn scale_maps_logical_pixels() {
        let mut c = canvas(10, 5);
        c.scale(1.0 / CELL_SCALE);
        c.fill_circle(8.0 * CELL_SCALE + 2.0, 2.0, 0.5, Rgba::WHITE);
        let lit: Vec<usize> = (0..c.light.len()).filter(|&i| c.light[i][0] > 0.0).collect();
        assert_eq!(lit, vec![8]);
    }

    #[test]
    fn off_screen_drawing_is_ignored() {
        let mut c = canvas(3, 3);
        c.fill_circle(-20.0, 4.0, 2.0, Rgba::WHITE);
        c.stroke_segment((100.0, 100.0), (120.0, 130.0), 2.0, Rgba::WHITE);
        c.fill_circle(f32::NAN, 1.0, 1.0, Rgba::WHITE);
        assert!(c.light.iter().all(|p| *p == [0.0; 3]));
    }

    #[test]
    fn segment_lights_its_path() {
        let mut c = canvas(10, 1);
        c.set_blend_mode(BlendMode::Lighter);
        c.stroke_segment((0.5, 0.5), (8.5, 0.5), 1.0, Rgba::WHITE);
        for x in 0..=8 {
            assert!(c.light[x][1] > 0.5, "pixel {x} unlit");
        }
        assert_eq!(c.light[c.cols + 5], [0.0; 3]);
    }

    #[test]
    fn present_writes_half_blocks() {
        let mut c = canvas(3, 2);
        c.fill_circle(0.5, 0.5, 0.6, Rgba::WHITE);
        c.present().unwrap();

        let text = String::from_utf8(c.out.clone()).unwrap();
        assert!(text.starts_with("\x1b[H"));
        assert_eq!(text.matches('▄').count(), 6);
        assert_eq!(text.matches("\r\n").count(), 1);
        assert!(text.contains("\x1b[48;2;255;255;255m"));
    }

    #[test]
    fn background_shows_through_dark_pixels() {
        let mut c = TerminalCanvas::new(Vec::new(), 2, 1, (10, 20, 30));
        c.present().unwrap();
        let text = String::from_utf8(c.out).unwrap();
        assert!(text.contains("\x1b[48;2;10;20;30m"));
        assert!(!text.contains("255"));
    }

    #[test]
    fn glyphs_replace_their_cell() {
        let mut c = canvas(4, 1);
        c.fill_glyph(0.0, 0.0, 'A', 20.0, Rgba::WHITE);
        c.fill_glyph(2.0, 1.0, '福', 20.0, Rgba::WHITE);
        c.present().unwrap();

        let text = String::from_utf8(c.out.clone()).unwrap();
        assert!(text.contains('A') && text.contains('福'));
        // one narrow glyph, one wide glyph spanning two cells
        assert_eq!(text.matches('▄').count(), 1);

        c.clear(0.0, 0.0);
        assert!(c.glyphs.iter().all(Option::is_none));
    }

    #[test]
    fn write_failures_surface_as_render_errors() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("pipe closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut c = TerminalCanvas::new(Broken, 2, 1, (0, 0, 0));
        assert!(matches!(c.present(), Err(RenderError::Io(_))));
    }

    #[test]
    fn metrics_follow_the_cell_grid() {
        let m = TerminalSurface::metrics_for(80, 24);
        assert_eq!(m.width, 320.0);
        assert_eq!(m.height, 192.0);
        assert_eq!(m.width * m.pixel_ratio, 80.0);
    }
}
