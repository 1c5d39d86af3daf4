//! Frame type and pixel conversion: YUYV and MJPEG to packed RGB.

use image::RgbImage;

/// A captured color camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// When the buffer was dequeued.
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Wrap the pixel data as an `image` buffer without copying.
    pub fn into_rgb_image(self) -> Result<RgbImage, FrameError> {
        let expected = (self.width * self.height * 3) as usize;
        let actual = self.data.len();
        RgbImage::from_raw(self.width, self.height, self.data)
            .ok_or(FrameError::InvalidLength { expected, actual })
    }
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 limited-range YCbCr to RGB, integer arithmetic.
fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_u8((298 * c + 409 * e + 128) >> 8),
        clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Convert packed YUYV (4:2:2) to packed RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Decode a single MJPEG frame to packed RGB, checking its size.
pub fn mjpeg_to_rgb(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .into_rgb8();
    if img.dimensions() != (width, height) {
        return Err(FrameError::SizeMismatch {
            expected: (width, height),
            actual: img.dimensions(),
        });
    }
    Ok(img.into_raw())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG decode failed: {0}")]
    Decode(String),
    #[error("decoded frame is {actual:?}, negotiated {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1 image: [Y0=16, U=128, Y1=235, V=128]
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_chroma() {
        // Strong V (red-difference) pushes red up and green down.
        let yuyv = vec![128, 128, 128, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 200, "r = {}", rgb[0]);
        assert!(rgb[1] < 130, "g = {}", rgb[1]);
        assert_eq!(&rgb[..3], &rgb[3..]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_mjpeg_decode() {
        let src = RgbImage::from_pixel(8, 8, image::Rgb([200, 200, 200]));
        let mut jpeg = Vec::new();
        src.write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let rgb = mjpeg_to_rgb(&jpeg, 8, 8).unwrap();
        assert_eq!(rgb.len(), 8 * 8 * 3);
        assert!((rgb[0] as i32 - 200).abs() < 8);
        assert!(matches!(mjpeg_to_rgb(&jpeg, 16, 8), Err(FrameError::SizeMismatch { .. })));
    }

    #[test]
    fn test_into_rgb_image() {
        let frame = Frame {
            data: vec![100; 4 * 2 * 3],
            width: 4,
            height: 2,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        let img = frame.into_rgb_image().unwrap();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(3, 1).0, [100, 100, 100]);
    }

    #[test]
    fn test_into_rgb_image_short_buffer() {
        let frame = Frame {
            data: vec![0; 5],
            width: 4,
            height: 2,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        assert!(frame.into_rgb_image().is_err());
    }
}
