//! TrueType font rendering using fontdue (pure Rust), with fontconfig lookup

use anyhow::{Context, Result};
use fontconfig::Fontconfig;
use fontdue::{Font, FontSettings};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Rendered text as ARGB bitmap
pub struct RenderedText {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u32>, // ARGB pixels (premultiplied alpha)
}

impl RenderedText {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    /// Composite onto a premultiplied ARGB buffer (source-over), clipping at
    /// the buffer edges
    pub fn blend_onto(&self, dst: &mut [u32], dst_width: usize, dst_height: usize, x: i32, y: i32) {
        for ty in 0..self.height {
            let py = y + ty as i32;
            if py < 0 || py >= dst_height as i32 {
                continue;
            }
            for tx in 0..self.width {
                let px = x + tx as i32;
                if px < 0 || px >= dst_width as i32 {
                    continue;
                }
                let src = self.data[ty * self.width + tx];
                let index = py as usize * dst_width + px as usize;
                dst[index] = over(src, dst[index]);
            }
        }
    }
}

/// Porter-Duff source-over for premultiplied ARGB
fn over(src: u32, dst: u32) -> u32 {
    let inv = 255 - (src >> 24);
    let mut out = 0u32;
    for shift in [0, 8, 16, 24] {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        let c = (s + (d * inv + 127) / 255).min(255);
        out |= c << shift;
    }
    out
}

/// Font renderer using fontdue
#[derive(Debug)]
pub struct FontRenderer {
    font: Font,
    size: f32,
}

impl FontRenderer {
    /// Load a TrueType font from a file path
    pub fn from_path(path: PathBuf, size: f32) -> Result<Self> {
        let font_data = fs::read(&path)
            .with_context(|| format!("Failed to read font file: {}", path.display()))?;

        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))?;

        info!(path = %path.display(), size = size, "Loaded font");
        Ok(Self { font, size })
    }

    /// Resolve a family name (e.g. "DejaVu Sans") through fontconfig
    pub fn from_font_name(family: &str, size: f32) -> Result<Self> {
        let fc = Fontconfig::new().context("Failed to initialize fontconfig")?;
        let font = fc
            .find(family, None)
            .with_context(|| format!("Font '{}' not found via fontconfig", family))?;
        debug!(family = %family, resolved = %font.name, path = %font.path.display(), "Resolved font");
        Self::from_path(font.path, size)
    }

    /// Fontconfig's default sans face, then well-known paths
    pub fn from_system_font(size: f32) -> Result<Self> {
        if let Ok(renderer) = Self::from_font_name("sans-serif", size) {
            return Ok(renderer);
        }

        let font_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
        ];

        for path in &font_paths {
            if let Ok(renderer) = Self::from_path(PathBuf::from(path), size) {
                return Ok(renderer);
            }
        }

        Err(anyhow::anyhow!(
            "Could not find any system fonts. Tried fontconfig and hardcoded paths: {:?}",
            font_paths
        ))
    }

    /// Render text to an ARGB bitmap with the given foreground color (transparent background)
    pub fn render_text(&self, text: &str, fg_color: u32) -> RenderedText {
        if text.is_empty() {
            return RenderedText::empty();
        }

        // Layout glyphs
        let mut glyphs = Vec::new();
        let mut x = 0.0f32;
        let mut max_ascent = 0i32;
        let mut max_descent = 0i32;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.size);

            let ascent = metrics.height as i32 + metrics.ymin;
            let descent = -metrics.ymin;
            max_ascent = max_ascent.max(ascent);
            max_descent = max_descent.max(descent);

            glyphs.push((x as i32, metrics, bitmap));
            x += metrics.advance_width;
        }

        let width = x.ceil() as usize;
        let height = (max_ascent + max_descent).max(0) as usize;

        if width == 0 || height == 0 {
            return RenderedText::empty();
        }

        let mut data = vec![0x00000000; width * height];

        // Foreground is NOT premultiplied - raw ARGB
        let fg_a = ((fg_color >> 24) & 0xFF) as f32 / 255.0;
        let fg_r = ((fg_color >> 16) & 0xFF) as f32 / 255.0;
        let fg_g = ((fg_color >> 8) & 0xFF) as f32 / 255.0;
        let fg_b = (fg_color & 0xFF) as f32 / 255.0;

        for (x_offset, metrics, bitmap) in glyphs {
            // Baseline sits max_ascent below the top
            let baseline_y = max_ascent - (metrics.height as i32 + metrics.ymin);

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let px = x_offset + gx as i32;
                    let py = baseline_y + gy as i32;

                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let coverage = bitmap[gy * metrics.width + gx] as f32 / 255.0;

                    if coverage > 0.0 {
                        let alpha = (fg_a * coverage * 255.0) as u32;
                        let r = (fg_r * fg_a * coverage * 255.0) as u32;
                        let g = (fg_g * fg_a * coverage * 255.0) as u32;
                        let b = (fg_b * fg_a * coverage * 255.0) as u32;

                        let pixel = (alpha << 24) | (r << 16) | (g << 8) | b;
                        data[(py as usize) * width + (px as usize)] = pixel;
                    }
                }
            }
        }

        RenderedText { width, height, data }
    }
}
