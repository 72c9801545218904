use image::{Rgb, RgbImage};

/// A 3-channel frame. Freshly created canvases are solid black.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major RGB bytes, top row first.
    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: [u8; 3]) {
        if let Some((x, y)) = self.clamp(x, y) {
            self.image.put_pixel(x, y, Rgb(color));
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Blend `color` over the current pixel with `coverage` in 0..=255.
    /// Coordinates outside the canvas are ignored.
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: [u8; 3], coverage: u8) {
        if coverage == 0 {
            return;
        }
        let Some((x, y)) = self.clamp(x, y) else {
            return;
        };
        let pixel = self.image.get_pixel_mut(x, y);
        let alpha = coverage as u32;
        for (dst, src) in pixel.0.iter_mut().zip(color) {
            let blended = (src as u32 * alpha + *dst as u32 * (255 - alpha) + 127) / 255;
            *dst = blended as u8;
        }
    }

    fn clamp(&self, x: i32, y: i32) -> Option<(u32, u32)> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        (x < self.width() && y < self.height()).then_some((x, y))
    }
}
