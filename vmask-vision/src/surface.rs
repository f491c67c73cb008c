//! 2D drawing surfaces.
//!
//! The [`Surface`] trait mirrors the small subset of a canvas context the
//! compositor needs: a save/restore stack of affine transforms, an image blit
//! into a local box and a filled ellipse around the local origin.
//! [`RasterSurface`] rasterizes onto an RGBA overlay; [`CommandLog`] only
//! records the calls.

use std::fmt;

use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

/// Straight (non-premultiplied) colour with a fractional alpha, as in CSS `rgba()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// Affine transform in canvas order:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(&mut self, tx: f32, ty: f32) {
        self.e += self.a * tx + self.c * ty;
        self.f += self.b * tx + self.d * ty;
    }

    pub fn rotate(&mut self, radians: f32) {
        let (sin, cos) = radians.sin_cos();
        let Affine { a, b, c, d, .. } = *self;
        self.a = a * cos + c * sin;
        self.b = b * cos + d * sin;
        self.c = c * cos - a * sin;
        self.d = d * cos - b * sin;
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn invert(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Affine {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        })
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Drawing target used by the compositor.
pub trait Surface {
    /// Erase the whole surface. The transform state is left alone.
    fn clear(&mut self);
    fn save(&mut self);
    /// Pop the transform pushed by the matching [`Surface::save`].
    fn restore(&mut self) -> Result<()>;
    fn translate(&mut self, x: f32, y: f32);
    fn rotate(&mut self, radians: f32);
    /// Draw `image` stretched into the local box `(x, y, width, height)`.
    fn draw_image(
        &mut self,
        image: &RgbaImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<()>;
    /// Fill an axis-aligned (in local space) ellipse centered at the local origin.
    fn fill_ellipse(&mut self, radius_x: f32, radius_y: f32, color: Color) -> Result<()>;
}

fn check_finite(what: &str, values: &[f32]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        bail!("{what}: non-finite argument {values:?}")
    }
}

/// A NaN or infinite translate/rotate poisons the transform; drawing under it fails.
fn check_transform(what: &str, transform: &Affine) -> Result<()> {
    if transform.is_finite() {
        Ok(())
    } else {
        bail!("{what}: non-finite transform {transform:?}")
    }
}

fn check_radii(radius_x: f32, radius_y: f32) -> Result<()> {
    check_finite("fill_ellipse", &[radius_x, radius_y])?;
    if radius_x < 0.0 || radius_y < 0.0 {
        bail!("fill_ellipse: negative radius ({radius_x}, {radius_y})");
    }
    Ok(())
}

/// Software rasterizer over a transparent RGBA overlay.
pub struct RasterSurface {
    canvas: RgbaImage,
    transform: Affine,
    stack: Vec<Affine>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            transform: Affine::IDENTITY,
            stack: Vec::new(),
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Blend the overlay over a camera frame of the same size.
    pub fn composite_onto(&self, frame: &mut RgbImage) -> Result<()> {
        if frame.dimensions() != self.canvas.dimensions() {
            bail!(
                "composite: frame is {:?}, overlay is {:?}",
                frame.dimensions(),
                self.canvas.dimensions()
            );
        }
        for (dst, src) in frame.pixels_mut().zip(self.canvas.pixels()) {
            let alpha = src[3] as f32 / 255.0;
            if alpha <= 0.0 {
                continue;
            }
            let inv = 1.0 - alpha;
            *dst = Rgb([
                mix(src[0], dst[0], alpha, inv),
                mix(src[1], dst[1], alpha, inv),
                mix(src[2], dst[2], alpha, inv),
            ]);
        }
        Ok(())
    }

    /// Device-space pixel bounds covered by a local rectangle, clamped to the canvas.
    fn device_bounds(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Option<(u32, u32, u32, u32)> {
        let corners = [
            self.transform.apply(x0, y0),
            self.transform.apply(x1, y0),
            self.transform.apply(x0, y1),
            self.transform.apply(x1, y1),
        ];
        let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

        let (w, h) = self.canvas.dimensions();
        let left = min_x.floor().max(0.0);
        let top = min_y.floor().max(0.0);
        let right = max_x.ceil().min(w as f32);
        let bottom = max_y.ceil().min(h as f32);
        if left >= right || top >= bottom {
            return None;
        }
        Some((left as u32, top as u32, right as u32, bottom as u32))
    }

    fn inverse(&self) -> Result<Affine> {
        self.transform
            .invert()
            .with_context(|| format!("transform is not invertible: {:?}", self.transform))
    }

    fn blend(&mut self, x: u32, y: u32, color: [u8; 3], alpha: f32) {
        let dst = self.canvas.get_pixel_mut(x, y);
        let dst_alpha = dst[3] as f32 / 255.0;
        let out_alpha = alpha + dst_alpha * (1.0 - alpha);
        if out_alpha <= 0.0 {
            return;
        }
        let channel = |s: u8, d: u8| {
            let v = (s as f32 * alpha + d as f32 * dst_alpha * (1.0 - alpha)) / out_alpha;
            v.round().clamp(0.0, 255.0) as u8
        };
        *dst = Rgba([
            channel(color[0], dst[0]),
            channel(color[1], dst[1]),
            channel(color[2], dst[2]),
            (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
        ]);
    }
}

fn mix(src: u8, dst: u8, alpha: f32, inv: f32) -> u8 {
    (src as f32 * alpha + dst as f32 * inv).round().clamp(0.0, 255.0) as u8
}

/// Bilinear sample at continuous pixel coordinates (pixel centers at +0.5).
fn sample_bilinear(image: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let (w, h) = image.dimensions();
    let x = (u - 0.5).clamp(0.0, (w - 1) as f32);
    let y = (v - 0.5).clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let mut out = [0.0f32; 4];
    for (c, slot) in out.iter_mut().enumerate() {
        *slot = p00[c] as f32 * w00 + p10[c] as f32 * w10 + p01[c] as f32 * w01 + p11[c] as f32 * w11;
    }
    out
}

impl Surface for RasterSurface {
    fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
    }

    fn restore(&mut self) -> Result<()> {
        self.transform = self
            .stack
            .pop()
            .context("restore without a matching save")?;
        Ok(())
    }

    fn translate(&mut self, x: f32, y: f32) {
        self.transform.translate(x, y);
    }

    fn rotate(&mut self, radians: f32) {
        self.transform.rotate(radians);
    }

    fn draw_image(
        &mut self,
        image: &RgbaImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<()> {
        check_finite("draw_image", &[x, y, width, height])?;
        check_transform("draw_image", &self.transform)?;
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 || width == 0.0 || height == 0.0 {
            return Ok(());
        }
        let inverse = self.inverse()?;
        let Some((left, top, right, bottom)) =
            self.device_bounds(x, y, x + width, y + height)
        else {
            return Ok(());
        };

        for py in top..bottom {
            for px in left..right {
                let (lx, ly) = inverse.apply(px as f32 + 0.5, py as f32 + 0.5);
                let u = (lx - x) / width * iw as f32;
                let v = (ly - y) / height * ih as f32;
                if u < 0.0 || v < 0.0 || u >= iw as f32 || v >= ih as f32 {
                    continue;
                }
                let s = sample_bilinear(image, u, v);
                let alpha = s[3] / 255.0;
                if alpha <= 0.0 {
                    continue;
                }
                let rgb = [s[0].round() as u8, s[1].round() as u8, s[2].round() as u8];
                self.blend(px, py, rgb, alpha);
            }
        }
        Ok(())
    }

    fn fill_ellipse(&mut self, radius_x: f32, radius_y: f32, color: Color) -> Result<()> {
        check_radii(radius_x, radius_y)?;
        check_transform("fill_ellipse", &self.transform)?;
        if radius_x == 0.0 || radius_y == 0.0 || color.a <= 0.0 {
            return Ok(());
        }
        let inverse = self.inverse()?;
        let Some((left, top, right, bottom)) =
            self.device_bounds(-radius_x, -radius_y, radius_x, radius_y)
        else {
            return Ok(());
        };

        let alpha = color.a.min(1.0);
        for py in top..bottom {
            for px in left..right {
                let (lx, ly) = inverse.apply(px as f32 + 0.5, py as f32 + 0.5);
                let nx = lx / radius_x;
                let ny = ly / radius_y;
                if nx * nx + ny * ny <= 1.0 {
                    self.blend(px, py, [color.r, color.g, color.b], alpha);
                }
            }
        }
        Ok(())
    }
}

/// One recorded call against a [`CommandLog`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Save,
    Restore,
    Translate { x: f32, y: f32 },
    Rotate { radians: f32 },
    DrawImage {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image_size: (u32, u32),
    },
    FillEllipse {
        radius_x: f32,
        radius_y: f32,
        color: Color,
    },
}

impl DrawCommand {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DrawCommand::DrawImage { .. } | DrawCommand::FillEllipse { .. }
        )
    }
}

/// Surface that records calls instead of drawing. It tracks the transform
/// like [`RasterSurface`] and rejects the same arguments and transforms.
#[derive(Debug, Default)]
pub struct CommandLog {
    pub commands: Vec<DrawCommand>,
    transform: Affine,
    stack: Vec<Affine>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of image blits and ellipse fills recorded.
    pub fn draw_calls(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    /// Current save depth; zero when every save has been restored.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Surface for CommandLog {
    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
        self.commands.push(DrawCommand::Save);
    }

    fn restore(&mut self) -> Result<()> {
        self.transform = self
            .stack
            .pop()
            .context("restore without a matching save")?;
        self.commands.push(DrawCommand::Restore);
        Ok(())
    }

    fn translate(&mut self, x: f32, y: f32) {
        self.transform.translate(x, y);
        self.commands.push(DrawCommand::Translate { x, y });
    }

    fn rotate(&mut self, radians: f32) {
        self.transform.rotate(radians);
        self.commands.push(DrawCommand::Rotate { radians });
    }

    fn draw_image(
        &mut self,
        image: &RgbaImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<()> {
        check_finite("draw_image", &[x, y, width, height])?;
        check_transform("draw_image", &self.transform)?;
        self.commands.push(DrawCommand::DrawImage {
            x,
            y,
            width,
            height,
            image_size: image.dimensions(),
        });
        Ok(())
    }

    fn fill_ellipse(&mut self, radius_x: f32, radius_y: f32, color: Color) -> Result<()> {
        check_radii(radius_x, radius_y)?;
        check_transform("fill_ellipse", &self.transform)?;
        self.commands.push(DrawCommand::FillEllipse {
            radius_x,
            radius_y,
            color,
        });
        Ok(())
    }
}
