// Map renderer: draws one marker per reported station onto the reference map.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};

use crate::error::RenderError;
use crate::tracker::Report;

use super::stations::{Point, StationRegistry};

/// Marker geometry before any output rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerStyle {
    pub radius: u32,
    /// Border drawn around the fill; 0 disables it.
    pub outline_width: u32,
    pub outline_color: Rgb<u8>,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            radius: 20,
            outline_width: 4,
            outline_color: Rgb([0, 0, 0]),
        }
    }
}

/// A marker resolved to output pixels. Participants at the same station
/// share a single pin.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub station: String,
    pub center: Point,
    pub radius: u32,
    pub outline_width: u32,
    pub color: Rgb<u8>,
    /// Sorted participant ids.
    pub participants: Vec<String>,
}

/// A composed map and the pins drawn on it.
#[derive(Debug, Clone)]
pub struct RenderedMap {
    pub image: RgbImage,
    pub pins: Vec<Pin>,
}

impl RenderedMap {
    pub fn encode_jpeg(&self) -> Result<Vec<u8>, RenderError> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    }
}

/// Renders batches onto a reference image that is decoded once at startup.
#[derive(Debug)]
pub struct MapRenderer {
    /// The decoded reference image, or why it could not be loaded.
    base: Result<Arc<RgbImage>, String>,
    registry: Arc<StationRegistry>,
    style: MarkerStyle,
    /// Size the composed image is produced at, when it differs from the asset.
    output_size: Option<(u32, u32)>,
}

impl MapRenderer {
    /// Load the reference image from disk.
    ///
    /// A missing or undecodable file is not fatal: the renderer is still
    /// built and every render fails with `AssetMissing`.
    pub fn load(
        path: &Path,
        registry: Arc<StationRegistry>,
        style: MarkerStyle,
        output_size: Option<(u32, u32)>,
    ) -> Self {
        let base = match image::open(path) {
            Ok(img) => {
                let img = img.to_rgb8();
                tracing::info!(
                    "Loaded reference map {} ({}x{})",
                    path.display(),
                    img.width(),
                    img.height()
                );
                Ok(Arc::new(img))
            }
            Err(e) => {
                tracing::warn!("Reference map {} unavailable: {e}", path.display());
                Err(format!("{}: {e}", path.display()))
            }
        };
        Self {
            base,
            registry,
            style,
            output_size,
        }
    }

    pub fn with_image(
        image: RgbImage,
        registry: Arc<StationRegistry>,
        style: MarkerStyle,
        output_size: Option<(u32, u32)>,
    ) -> Self {
        Self {
            base: Ok(Arc::new(image)),
            registry,
            style,
            output_size,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.base.is_ok()
    }

    /// Resolve reports to pins for an output image of `width` x `height`.
    ///
    /// Reports at the same station merge into one pin whose color is the
    /// per-channel mean of the participants' colors. Pins come out in
    /// station-name order. Stations missing from the registry are skipped.
    pub fn layout<F>(&self, reports: &[Report], width: u32, height: u32, color_of: F) -> Vec<Pin>
    where
        F: Fn(&str) -> Rgb<u8>,
    {
        let mut by_station: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for report in reports {
            by_station
                .entry(report.station.as_str())
                .or_default()
                .push(report.participant.as_str());
        }

        let radius = self.registry.marker_radius(self.style.radius, width, height);
        let outline_width = match self.style.outline_width {
            0 => 0,
            w => self.registry.marker_radius(w, width, height),
        };

        let mut pins = Vec::with_capacity(by_station.len());
        for (station, mut participants) in by_station {
            let Some(center) = self.registry.resolve(station, width, height) else {
                tracing::warn!(
                    "Skipping pin for {station}: not in station registry ({} participant(s))",
                    participants.len()
                );
                continue;
            };
            participants.sort_unstable();
            let color = blend(participants.iter().map(|p| color_of(p)));
            pins.push(Pin {
                station: station.to_string(),
                center,
                radius,
                outline_width,
                color,
                participants: participants.into_iter().map(String::from).collect(),
            });
        }
        pins
    }

    /// Compose the batch onto a copy of the reference image.
    pub fn render<F>(&self, reports: &[Report], color_of: F) -> Result<RenderedMap, RenderError>
    where
        F: Fn(&str) -> Rgb<u8>,
    {
        let base: &RgbImage = match &self.base {
            Ok(img) => &**img,
            Err(reason) => return Err(RenderError::AssetMissing(reason.clone())),
        };

        let mut image = match self.output_size {
            Some((w, h)) if (w, h) != base.dimensions() => {
                imageops::resize(base, w, h, FilterType::Triangle)
            }
            _ => base.clone(),
        };

        let (width, height) = image.dimensions();
        let pins = self.layout(reports, width, height, color_of);
        for pin in &pins {
            if pin.outline_width > 0 {
                fill_circle(
                    &mut image,
                    pin.center,
                    pin.radius + pin.outline_width,
                    self.style.outline_color,
                );
            }
            fill_circle(&mut image, pin.center, pin.radius, pin.color);
        }

        Ok(RenderedMap { image, pins })
    }
}

/// Per-channel rounded mean. An empty iterator yields black.
fn blend<I>(colors: I) -> Rgb<u8>
where
    I: IntoIterator<Item = Rgb<u8>>,
{
    let mut sums = [0u32; 3];
    let mut n = 0u32;
    for Rgb(c) in colors {
        for (sum, channel) in sums.iter_mut().zip(c) {
            *sum += channel as u32;
        }
        n += 1;
    }
    if n == 0 {
        return Rgb([0, 0, 0]);
    }
    Rgb(sums.map(|sum| ((sum + n / 2) / n) as u8))
}

/// Fill a disc, clipped to the image bounds.
fn fill_circle(image: &mut RgbImage, center: Point, radius: u32, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let r = radius as f64;
    let min_x = ((center.x - r).floor() as i64).max(0);
    let max_x = ((center.x + r).ceil() as i64).min(width as i64 - 1);
    let min_y = ((center.y - r).floor() as i64).max(0);
    let max_y = ((center.y + r).ceil() as i64).min(height as i64 - 1);

    for y in min_y..=max_y {
        let dy = y as f64 - center.y;
        for x in min_x..=max_x {
            let dx = x as f64 - center.x;
            if dx * dx + dy * dy <= r * r {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
