use image::{GrayImage, Rgb, RgbImage};

#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub overlay_opacity: f32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self { overlay_opacity: 0.5 }
    }
}

pub struct Visualizer {
    config: VisualizationConfig
}

impl Visualizer {
    pub fn new() -> Self {
        Self { config: VisualizationConfig::default() }
    }

    pub fn with_config(config: VisualizationConfig) -> Self {
        Self { config }
    }

    pub fn create_heatmap(&self, gray: &GrayImage) -> RgbImage {
        let (width, height) = gray.dimensions();
        let mut heatmap = RgbImage::new(width, height);

        for (x, y, pixel) in gray.enumerate_pixels() {
            let intensity = pixel[0] as f32 / 255.0;
            let color = Self::intensity_to_color(intensity);
            heatmap.put_pixel(x, y, color);
        }

        heatmap
    }

    // blue -> cyan -> green -> yellow -> red
    fn intensity_to_color(intensity: f32) -> Rgb<u8> {
        let intensity = intensity.clamp(0.0, 1.0);

        let (r, g, b) = if intensity < 0.25 {
            let t = intensity / 0.25;
            (0.0, t, 1.0)
        } else if intensity < 0.5 {
            let t = (intensity - 0.25) / 0.25;
            (0.0, 1.0, 1.0 - t)
        } else if intensity < 0.75 {
            let t = (intensity - 0.5) / 0.25;
            (t, 1.0, 0.0)
        } else {
            let t = (intensity - 0.75) / 0.25;
            (1.0, 1.0 - t, 0.0)
        };
        Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
    }

    /// Alpha-blends `heatmap` over `original`. A smaller heatmap is clamped at
    /// its edges rather than tiled.
    pub fn overlay_heatmap(&self, original: &RgbImage, heatmap: &RgbImage) -> RgbImage {
        let (width, height) = original.dimensions();
        let mut result = RgbImage::new(width, height);
        let alpha = self.config.overlay_opacity.clamp(0.0, 1.0);

        if heatmap.width() == 0 || heatmap.height() == 0 {
            return original.clone();
        }

        for y in 0..height {
            for x in 0..width {
                let orig = original.get_pixel(x, y);
                let heat = heatmap.get_pixel(
                    x.min(heatmap.width() - 1),
                    y.min(heatmap.height() - 1)
                );

                let r = ((1.0 - alpha) * orig[0] as f32 + alpha * heat[0] as f32) as u8;
                let g = ((1.0 - alpha) * orig[1] as f32 + alpha * heat[1] as f32) as u8;
                let b = ((1.0 - alpha) * orig[2] as f32 + alpha * heat[2] as f32) as u8;

                result.put_pixel(x, y, Rgb([r, g, b]));
            }
        }

        result
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}
