//! Draw RGB images with half-block characters
//!
//! Each terminal cell shows two vertical pixels: the upper one as the `▀`
//! foreground, the lower one as the background.

use image::RgbImage;
use ratatui::{buffer::Buffer, layout::Rect, style::Color, style::Style, widgets::Widget};

pub struct HalfBlockImage<'a> {
    image: &'a RgbImage,
}

impl<'a> HalfBlockImage<'a> {
    pub fn new(image: &'a RgbImage) -> Self {
        Self { image }
    }
}

/// Largest (columns, rows) that fit `area` while keeping the image aspect
pub fn fit(image_width: u32, image_height: u32, area: Rect) -> (u16, u16) {
    if image_width == 0 || image_height == 0 || area.width == 0 || area.height == 0 {
        return (0, 0);
    }
    let aspect = image_width as f64 / image_height as f64;
    let term_width = area.width as f64;
    let term_height = (area.height * 2) as f64; // two pixels per cell

    if term_width / term_height > aspect {
        // Area is wider - fit to height
        let w = term_height * aspect;
        ((w as u16).max(1), area.height)
    } else {
        // Area is taller - fit to width
        let h = term_width / aspect;
        (area.width, ((h / 2.0) as u16).max(1))
    }
}

impl Widget for HalfBlockImage<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (width, height) = (self.image.width(), self.image.height());
        let (cols, rows) = fit(width, height, area);
        if cols == 0 || rows == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + area.width.saturating_sub(cols) / 2;
        let y_offset = area.y + area.height.saturating_sub(rows) / 2;

        let x_scale = width as f64 / cols as f64;
        let y_scale = height as f64 / (rows as f64 * 2.0);

        for ty in 0..rows {
            for tx in 0..cols {
                let src_x = ((tx as f64 * x_scale) as u32).min(width - 1);
                let src_top = ((ty as f64 * 2.0 * y_scale) as u32).min(height - 1);
                let src_bottom = (((ty as f64 * 2.0 + 1.0) * y_scale) as u32).min(height - 1);

                let top = self.image.get_pixel(src_x, src_top).0;
                let bottom = self.image.get_pixel(src_x, src_bottom).0;

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(Color::Rgb(top[0], top[1], top[2]));
                    cell.set_bg(Color::Rgb(bottom[0], bottom[1], bottom[2]));
                }
            }
        }
    }
}

/// Centered one-line message, used when there is nothing to show
pub fn placeholder(msg: &str, style: Style, area: Rect, buf: &mut Buffer) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    let width = (msg.chars().count() as u16).min(area.width);
    let x = area.x + (area.width - width) / 2;
    let y = area.y + area.height / 2;
    buf.set_stringn(x, y, msg, area.width as usize, style);
}
