use gesture_alert_common::config::EnhanceConfig;
use gesture_alert_common::frame::Frame;
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};

const NUM_BINS: usize = 256;

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `grid x grid` set of tiles. Each tile gets its
/// own equalization table built from a clipped histogram, and every pixel is
/// bilinearly interpolated between the tables of the four nearest tiles so
/// no tile seams show. Clipping, residual redistribution and interpolation
/// follow OpenCV's CLAHE. When the image size is not a multiple of the grid,
/// tiles here differ in size by one pixel instead of OpenCV's reflect padding.
#[derive(Debug, Clone)]
pub struct Clahe {
    clip_limit: f64,
    grid: u32,
}

impl Clahe {
    pub fn new(clip_limit: f64, grid: u32) -> Self {
        Self {
            clip_limit,
            grid: grid.max(1),
        }
    }

    pub fn from_config(config: &EnhanceConfig) -> Self {
        Self::new(config.clip_limit, config.tile_grid)
    }

    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return gray.clone();
        }

        // Never more tiles than pixels along an axis.
        let tiles_x = self.grid.min(width);
        let tiles_y = self.grid.min(height);

        let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            let (y0, y1) = tile_span(ty, tiles_y, height);
            for tx in 0..tiles_x {
                let (x0, x1) = tile_span(tx, tiles_x, width);
                luts.push(self.tile_lut(gray, x0, x1, y0, y1));
            }
        }
        let lut = |tx: usize, ty: usize| &luts[ty * tiles_x as usize + tx];

        let columns: Vec<_> = (0..width).map(|x| axis_weight(x, width, tiles_x)).collect();

        let mut out = GrayImage::new(width, height);
        for y in 0..height {
            let (ty1, ty2, ya) = axis_weight(y, height, tiles_y);
            for x in 0..width {
                let (tx1, tx2, xa) = columns[x as usize];
                let v = gray.get_pixel(x, y).0[0] as usize;

                let top = (1.0 - xa) * lut(tx1, ty1)[v] as f32 + xa * lut(tx2, ty1)[v] as f32;
                let bottom = (1.0 - xa) * lut(tx1, ty2)[v] as f32 + xa * lut(tx2, ty2)[v] as f32;
                let value = (1.0 - ya) * top + ya * bottom;

                out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
            }
        }
        out
    }

    /// Equalization table for the tile covering `[x0, x1) x [y0, y1)`.
    fn tile_lut(&self, gray: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32) -> [u8; NUM_BINS] {
        let mut hist = [0u32; NUM_BINS];
        for y in y0..y1 {
            for x in x0..x1 {
                hist[gray.get_pixel(x, y).0[0] as usize] += 1;
            }
        }
        let area = (x1 - x0) * (y1 - y0);

        if self.clip_limit > 0.0 {
            let clip = ((self.clip_limit * area as f64 / NUM_BINS as f64) as u32).max(1);
            clip_histogram(&mut hist, clip);
        }

        let scale = 255.0 / area as f32;
        let mut lut = [0u8; NUM_BINS];
        let mut sum = 0u32;
        for (bin, count) in hist.iter().enumerate() {
            sum += count;
            lut[bin] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }
}

/// Clip every bin at `clip` and spread the excess evenly over all bins.
fn clip_histogram(hist: &mut [u32; NUM_BINS], clip: u32) {
    let mut clipped = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            clipped += *count - clip;
            *count = clip;
        }
    }

    let per_bin = clipped / NUM_BINS as u32;
    let residual = (clipped % NUM_BINS as u32) as usize;
    for count in hist.iter_mut() {
        *count += per_bin;
    }
    if residual > 0 {
        let step = (NUM_BINS / residual).max(1);
        for bin in (0..NUM_BINS).step_by(step).take(residual) {
            hist[bin] += 1;
        }
    }
}

/// Pixel range `[start, end)` of tile `index` out of `tiles` along an axis of `len` pixels.
fn tile_span(index: u32, tiles: u32, len: u32) -> (u32, u32) {
    (index * len / tiles, (index + 1) * len / tiles)
}

/// Neighbouring tiles and the weight of the second one for a pixel position.
/// Pixels outside the outermost tile centers clamp to the edge tile.
fn axis_weight(pos: u32, len: u32, tiles: u32) -> (usize, usize, f32) {
    let t = pos as f32 * tiles as f32 / len as f32 - 0.5;
    if t <= 0.0 {
        return (0, 0, 0.0);
    }
    let lo = t.floor() as usize;
    let last = tiles as usize - 1;
    if lo >= last {
        return (last, last, 0.0);
    }
    (lo, lo + 1, t - lo as f32)
}

/// BT.601 luma (0.299 R + 0.587 G + 0.114 B) in 14-bit fixed point, rounded,
/// matching OpenCV's color-to-gray conversion.
fn luma(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let v = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
        Luma([v as u8])
    })
}

/// Prepare a captured frame for the landmark detector: mirror it horizontally
/// (selfie view), then grayscale, equalize and recolor in place.
pub fn preprocess(frame: &mut Frame, clahe: &Clahe) {
    imageops::flip_horizontal_in_place(&mut frame.image);
    let gray = luma(&frame.image);
    let equalized = clahe.apply(&gray);
    for (dst, src) in frame.image.pixels_mut().zip(equalized.pixels()) {
        let v = src.0[0];
        *dst = Rgb([v, v, v]);
    }
}
