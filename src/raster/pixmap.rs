//! Pixel buffers produced by rasterization.

/// Row-major interleaved pixel layout, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// An owned pixel buffer.
///
/// `width * height * channels == data.len()` always holds; the buffer is
/// allocated by the constructor and never resized.
#[derive(Debug, Clone)]
pub struct Pixmap {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Pixmap {
    /// Allocate a buffer filled with opaque white.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channels();
        Pixmap {
            width,
            height,
            format,
            data: vec![0xff; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Fill every pixel with an RGB color (alpha, if present, to opaque).
    pub fn fill(&mut self, rgb: [u8; 3]) {
        let channels = self.format.channels();
        for px in self.data.chunks_mut(channels) {
            px[0] = rgb[0];
            px[1] = rgb[1];
            px[2] = rgb[2];
            if channels == 4 {
                px[3] = 0xff;
            }
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channels()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.index(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.data[i] = rgb[0];
        self.data[i + 1] = rgb[1];
        self.data[i + 2] = rgb[2];
        if self.format == PixelFormat::Rgba8 {
            self.data[i + 3] = 0xff;
        }
    }

    /// Write a pixel with an explicit alpha value. On an RGB buffer the
    /// alpha byte is dropped.
    pub fn set_pixel_rgba(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.data[i] = rgba[0];
        self.data[i + 1] = rgba[1];
        self.data[i + 2] = rgba[2];
        if self.format == PixelFormat::Rgba8 {
            self.data[i + 3] = rgba[3];
        }
    }

    /// Source-over blend of an RGB color at the given coverage.
    pub fn blend_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3], alpha: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        if alpha >= 1.0 {
            self.set_pixel(x, y, rgb);
            return;
        }
        if alpha <= 0.0 {
            return;
        }
        let i = self.index(x, y);
        for c in 0..3 {
            let dst = self.data[i + c] as f32;
            let src = rgb[c] as f32;
            self.data[i + c] = (src * alpha + dst * (1.0 - alpha)).round() as u8;
        }
        if self.format == PixelFormat::Rgba8 {
            self.data[i + 3] = 0xff;
        }
    }

    /// View as an `image` RGB buffer for encoding or resampling. An RGBA
    /// buffer is flattened onto white.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        match self.format {
            PixelFormat::Rgb8 => {
                image::RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
            }
            PixelFormat::Rgba8 => {
                let mut rgb = image::RgbImage::new(self.width, self.height);
                for (x, y, px) in rgb.enumerate_pixels_mut() {
                    let i = self.index(x, y);
                    let a = self.data[i + 3] as f32 / 255.0;
                    let mut out = [0u8; 3];
                    for c in 0..3 {
                        let src = self.data[i + c] as f32;
                        out[c] = (src * a + 255.0 * (1.0 - a)).round() as u8;
                    }
                    *px = image::Rgb(out);
                }
                rgb
            }
        }
    }

    /// View as an `image` RGBA buffer; an RGB source gets opaque alpha.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        match self.format {
            PixelFormat::Rgba8 => {
                image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_else(|| image::RgbaImage::new(self.width, self.height))
            }
            PixelFormat::Rgb8 => {
                let mut rgba = image::RgbaImage::new(self.width, self.height);
                for (x, y, px) in rgba.enumerate_pixels_mut() {
                    let p = self.get_pixel(x, y);
                    *px = image::Rgba([p[0], p[1], p[2], 0xff]);
                }
                rgba
            }
        }
    }
}
