//! Floating-point RGBA image used by the software backend.

use glam::{Vec2, Vec3, Vec4};

/// Rec. 709 luma weights.
pub const LUMA: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);

/// Relative luminance of a linear color.
#[inline]
#[must_use]
pub fn luminance(color: Vec4) -> f32 {
    color.truncate().dot(LUMA)
}

/// Linear RGBA image, row-major, origin top-left.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl Image {
    /// A transparent black image.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Vec4::ZERO)
    }

    #[must_use]
    pub fn filled(width: u32, height: u32, color: Vec4) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Builds an image by evaluating `f(x, y)` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Vec4) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [Vec4] {
        &mut self.pixels
    }

    /// Pixel at `(x, y)`, clamped to the image bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, i64::from(self.width) - 1) as usize;
        let y = y.clamp(0, i64::from(self.height) - 1) as usize;
        self.pixels[y * self.width as usize + x]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Vec4) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = color;
        }
    }

    /// Texture coordinate of the center of pixel `(x, y)`.
    #[inline]
    #[must_use]
    pub fn uv(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }

    /// Size of one texel in uv units.
    #[inline]
    #[must_use]
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    /// Bilinear sample with clamp-to-edge addressing.
    #[must_use]
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let px = uv.x * self.width as f32 - 0.5;
        let py = uv.y * self.height as f32 - 0.5;
        let x0 = px.floor();
        let y0 = py.floor();
        let fx = px - x0;
        let fy = py - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.get(x0, y0).lerp(self.get(x0 + 1, y0), fx);
        let bottom = self.get(x0, y0 + 1).lerp(self.get(x0 + 1, y0 + 1), fx);
        top.lerp(bottom, fy)
    }

    /// Nearest-texel sample with clamp-to-edge addressing.
    #[must_use]
    pub fn sample_nearest(&self, uv: Vec2) -> Vec4 {
        let x = (uv.x * self.width as f32).floor() as i64;
        let y = (uv.y * self.height as f32).floor() as i64;
        self.get(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_hits_texel_centers_exactly() {
        let image = Image::from_fn(2, 1, |x, _| Vec4::splat(x as f32));
        assert_eq!(image.sample(image.uv(0, 0)), Vec4::ZERO);
        assert_eq!(image.sample(image.uv(1, 0)), Vec4::ONE);
        assert_eq!(image.sample(Vec2::new(0.5, 0.5)), Vec4::splat(0.5));
    }

    #[test]
    fn sampling_clamps_to_edge() {
        let image = Image::filled(3, 3, Vec4::ONE);
        assert_eq!(image.sample(Vec2::new(-2.0, 5.0)), Vec4::ONE);
    }
}
