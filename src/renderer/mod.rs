mod canvas;
mod truetype_font;

pub use canvas::Canvas;
pub use truetype_font::{load_font, TrueTypeFont};

pub const WHITE: [u8; 3] = [255, 255, 255];

/// Something that can draw a line of text onto a canvas.
pub trait TextRasterizer {
    /// Draw `text` with its top-left corner at (`x`, `y`). Pixels falling
    /// outside the canvas are dropped.
    fn draw_text(&self, canvas: &mut Canvas, x: i32, y: i32, text: &str, color: [u8; 3]);
}

/// Builds one output frame: a black canvas with white text in the top-left corner.
pub struct FrameCompositor<'a> {
    width: u32,
    height: u32,
    text: &'a dyn TextRasterizer,
}

impl<'a> FrameCompositor<'a> {
    pub fn new(width: u32, height: u32, text: &'a dyn TextRasterizer) -> Self {
        Self {
            width,
            height,
            text,
        }
    }

    pub fn compose(&self, text: &str) -> Canvas {
        let mut canvas = Canvas::new(self.width, self.height);
        self.text.draw_text(&mut canvas, 0, 0, text, WHITE);
        canvas
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Canvas, TextRasterizer};

    /// Deterministic stand-in for a real font. Characters advance by `size`
    /// pixels; a digit `d` is a `size`-wide bar `d + 1` pixels tall, any other
    /// character a `size`×`size` block, and spaces stay empty.
    pub struct BlockText {
        pub size: i32,
    }

    impl TextRasterizer for BlockText {
        fn draw_text(&self, canvas: &mut Canvas, x: i32, y: i32, text: &str, color: [u8; 3]) {
            for (i, ch) in text.chars().enumerate() {
                let height = match ch {
                    ' ' => continue,
                    d if d.is_ascii_digit() => d as i32 - '0' as i32 + 1,
                    _ => self.size,
                };
                let left = x + i as i32 * self.size;
                for dy in 0..height {
                    for dx in 0..self.size {
                        canvas.set_pixel(left + dx, y + dy, color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::BlockText;
    use super::*;

    #[test]
    fn compose_draws_white_text_at_origin() {
        let blocks = BlockText { size: 2 };
        let compositor = FrameCompositor::new(8, 4, &blocks);
        let canvas = compositor.compose("ab");

        assert_eq!(canvas.width(), 8);
        assert_eq!(canvas.height(), 4);
        assert_eq!(canvas.get_pixel(0, 0), Some(WHITE));
        assert_eq!(canvas.get_pixel(3, 1), Some(WHITE));
        assert_eq!(canvas.get_pixel(4, 0), Some([0, 0, 0]));
        assert_eq!(canvas.get_pixel(0, 2), Some([0, 0, 0]));
    }

    #[test]
    fn overflowing_text_is_cut_at_the_canvas_edge() {
        let blocks = BlockText { size: 3 };
        let compositor = FrameCompositor::new(4, 2, &blocks);
        let canvas = compositor.compose("+12.3");
        assert!(canvas.data().iter().all(|&b| b == 255));
    }

    #[test]
    fn every_frame_starts_from_black() {
        let blocks = BlockText { size: 1 };
        let compositor = FrameCompositor::new(3, 1, &blocks);
        let first = compositor.compose("xxx");
        let second = compositor.compose("x");
        assert_ne!(first, second);
        assert_eq!(second.get_pixel(1, 0), Some([0, 0, 0]));
    }
}
