use image::RgbImage;

/// A decoded RGB camera frame with capture metadata.
///
/// Frames arrive from the capture process as tightly packed `rgb24` rows and
/// are mutated in place by preprocessing before detection.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at_ms: i64,
    pub seq: u64,
}

/// Bytes per `rgb24` pixel.
pub const CHANNELS: usize = 3;

impl Frame {
    /// Wrap a raw `rgb24` buffer. The buffer must hold exactly `width * height * 3` bytes.
    pub fn from_rgb(
        width: u32,
        height: u32,
        data: Vec<u8>,
        captured_at_ms: i64,
        seq: u64,
    ) -> Result<Self, FrameError> {
        let expected = Self::byte_len(width, height);
        let got = data.len();
        let image = RgbImage::from_raw(width, height, data)
            .ok_or(FrameError::SizeMismatch { got, expected })?;
        Ok(Self {
            image,
            captured_at_ms,
            seq,
        })
    }

    /// Size in bytes of one `rgb24` frame of the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The packed pixel bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame buffer has {got} bytes, expected {expected}")]
    SizeMismatch { got: usize, expected: usize },
}
