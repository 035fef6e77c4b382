//! Frame type and pixel conversion: YUYV to RGB, MJPG decode, dark detection.

use image::RgbImage;

/// Pixels with luma below this count as dark.
const DARK_LUMA: u8 = 32;
/// Fraction of dark pixels above which a frame is rejected.
pub const DARK_FRACTION: f32 = 0.95;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let n = self.image.pixels().len();
        if n == 0 {
            return 0.0;
        }
        self.image.pixels().map(|p| luma(p.0) as f32).sum::<f32>() / n as f32
    }

    /// True when more than 95% of pixels are near black (lens covered, lights off).
    pub fn is_dark(&self) -> bool {
        is_dark_image(&self.image, DARK_FRACTION)
    }
}

/// BT.601 luma of an RGB pixel.
pub fn luma([r, g, b]: [u8; 3]) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

pub fn is_dark_image(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.pixels().len();
    if total == 0 {
        return true;
    }
    let dark = image.pixels().filter(|p| luma(p.0) < DARK_LUMA).count();
    (dark as f32 / total as f32) > threshold_pct
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// Every 4 bytes `[Y0, U, Y1, V]` hold two pixels sharing one chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected || width % 2 != 0 {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// BT.601 limited-range YCbCr → RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(1.164 * c + 1.596 * e),
        clamp(1.164 * c - 0.392 * d - 0.813 * e),
        clamp(1.164 * c + 2.017 * d),
    ]
}

/// Decode a motion-JPEG buffer to RGB.
pub fn decode_mjpg(buf: &[u8]) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?;
    Ok(decoded.to_rgb8())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_grey_maps_to_grey() {
        // Neutral chroma: Y=16 is black, Y=235 is white.
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // Strong Cr pushes red up and green down.
        let yuyv = vec![82, 90, 82, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let [r, g, b] = rgb.get_pixel(0, 0).0;
        assert!(r > 200 && g < 60 && b < 60, "got {r},{g},{b}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
        assert!(yuyv_to_rgb(&[0; 6], 3, 1).is_err());
    }

    #[test]
    fn test_decode_mjpg_roundtrip_dimensions() {
        let img = RgbImage::from_pixel(8, 4, Rgb([200, 100, 50]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
        let decoded = decode_mjpg(buf.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert!(decode_mjpg(b"not a jpeg").is_err());
    }

    #[test]
    fn test_dark_detection() {
        assert!(is_dark_image(&RgbImage::new(10, 10), DARK_FRACTION));
        assert!(is_dark_image(&RgbImage::new(0, 0), DARK_FRACTION));
        let lit = RgbImage::from_pixel(10, 10, Rgb([128, 128, 128]));
        assert!(!is_dark_image(&lit, DARK_FRACTION));

        // 94 dark, 6 bright → not dark; 96 dark, 4 bright → dark.
        let mut img = RgbImage::new(10, 10);
        for i in 0..6 {
            img.put_pixel(i, 0, Rgb([200, 200, 200]));
        }
        assert!(!is_dark_image(&img, DARK_FRACTION));
        let mut img = RgbImage::new(10, 10);
        for i in 0..4 {
            img.put_pixel(i, 0, Rgb([200, 200, 200]));
        }
        assert!(is_dark_image(&img, DARK_FRACTION));
    }

    #[test]
    fn test_frame_brightness() {
        let frame = Frame {
            image: RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])),
            sequence: 0,
        };
        assert!((frame.avg_brightness() - 100.0).abs() < 1.0);
        assert!(!frame.is_dark());
    }
}
