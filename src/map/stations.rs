// Station registry: static name -> position lookup on the reference map.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Suffix meaning "station"; `渋谷駅` resolves to `渋谷`.
const STATION_SUFFIX: &str = "駅";

/// A resolved position in output-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// How the registry's positions are expressed. One registry uses exactly one
/// convention, so a render pass can never mix them.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coordinates {
    /// Absolute pixels on a reference image of the given nominal size.
    Pixel {
        reference_width: u32,
        reference_height: u32,
    },
    /// Fractions of the output image's width and height, in [0, 1].
    Ratio,
}

impl Coordinates {
    /// Per-axis factors that map stored positions onto an output image.
    fn axis_scale(&self, output_width: u32, output_height: u32) -> (f64, f64) {
        match *self {
            Coordinates::Pixel {
                reference_width,
                reference_height,
            } => (
                output_width as f64 / reference_width as f64,
                output_height as f64 / reference_height as f64,
            ),
            Coordinates::Ratio => (output_width as f64, output_height as f64),
        }
    }
}

/// On-disk layout of a stations file.
#[derive(Debug, Deserialize)]
struct StationsFile {
    coordinates: Coordinates,
    stations: HashMap<String, [f64; 2]>,
}

/// Read-only station table, loaded once at startup.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    coordinates: Coordinates,
    positions: HashMap<String, (f64, f64)>,
}

impl StationRegistry {
    /// Build a registry, validating every position against the convention.
    pub fn new<I, S>(coordinates: Coordinates, stations: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, (f64, f64))>,
        S: Into<String>,
    {
        if let Coordinates::Pixel {
            reference_width,
            reference_height,
        } = coordinates
        {
            if reference_width == 0 || reference_height == 0 {
                return Err(ConfigError::invalid(
                    "coordinates",
                    "reference size must be non-zero",
                ));
            }
        }

        let mut positions = HashMap::new();
        for (name, (x, y)) in stations {
            let name = name.into();
            let valid = match coordinates {
                Coordinates::Pixel { .. } => x.is_finite() && y.is_finite() && x >= 0.0 && y >= 0.0,
                Coordinates::Ratio => (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y),
            };
            if !valid {
                return Err(ConfigError::invalid(
                    format!("station '{name}'"),
                    format!("position ({x}, {y}) is out of range"),
                ));
            }
            positions.insert(name, (x, y));
        }

        Ok(Self {
            coordinates,
            positions,
        })
    }

    /// Parse a stations table from JSON.
    pub fn from_json(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: StationsFile =
            serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(
            file.coordinates,
            file.stations.into_iter().map(|(name, [x, y])| (name, (x, y))),
        )
    }

    /// Load a stations table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents, path)
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Match free-form message text to a registered station name.
    ///
    /// Surrounding whitespace is ignored and a trailing `駅` is accepted.
    /// An exact key always wins over the suffix-stripped form.
    pub fn canonical_name(&self, text: &str) -> Option<&str> {
        let text = text.trim();
        if let Some((name, _)) = self.positions.get_key_value(text) {
            return Some(name.as_str());
        }
        let stripped = text.strip_suffix(STATION_SUFFIX)?.trim_end();
        self.positions
            .get_key_value(stripped)
            .map(|(name, _)| name.as_str())
    }

    /// Resolve a station to output pixels for an image of the given size.
    pub fn resolve(&self, name: &str, output_width: u32, output_height: u32) -> Option<Point> {
        let &(x, y) = self.positions.get(name)?;
        let (sx, sy) = self.coordinates.axis_scale(output_width, output_height);
        Some(Point {
            x: x * sx,
            y: y * sy,
        })
    }

    /// Marker radius for an output image of the given size.
    ///
    /// Pixel registries scale by the mean of the two axis factors, floored and
    /// never below 1. Ratio registries use the radius unchanged.
    pub fn marker_radius(&self, base: u32, output_width: u32, output_height: u32) -> u32 {
        match self.coordinates {
            Coordinates::Pixel { .. } => {
                let (sx, sy) = self.coordinates.axis_scale(output_width, output_height);
                let scaled = (base as f64 * (sx + sy) / 2.0).floor() as u32;
                scaled.max(1)
            }
            Coordinates::Ratio => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel_registry() -> StationRegistry {
        StationRegistry::new(
            Coordinates::Pixel {
                reference_width: 1000,
                reference_height: 1000,
            },
            [("渋谷", (100.0, 100.0)), ("東京", (400.0, 800.0))],
        )
        .unwrap()
    }

    #[test]
    fn test_pixel_resolve_at_reference_size() {
        let registry = pixel_registry();
        let p = registry.resolve("渋谷", 1000, 1000).unwrap();
        assert_eq!(p, Point { x: 100.0, y: 100.0 });
        assert_eq!(registry.marker_radius(10, 1000, 1000), 10);
    }

    #[test]
    fn test_pixel_resolve_after_downscale() {
        let registry = pixel_registry();
        let p = registry.resolve("東京", 500, 500).unwrap();
        assert_eq!(p, Point { x: 200.0, y: 400.0 });
        assert_eq!(registry.marker_radius(10, 500, 500), 5);
    }

    #[test]
    fn test_pixel_axes_scale_independently() {
        let registry = pixel_registry();
        let p = registry.resolve("東京", 2000, 500).unwrap();
        assert_eq!(p, Point { x: 800.0, y: 400.0 });
        // mean factor (2.0 + 0.5) / 2 = 1.25
        assert_eq!(registry.marker_radius(10, 2000, 500), 12);
    }

    #[test]
    fn test_marker_radius_never_below_one() {
        let registry = pixel_registry();
        assert_eq!(registry.marker_radius(3, 100, 100), 1);
    }

    #[test]
    fn test_ratio_resolve() {
        let registry =
            StationRegistry::new(Coordinates::Ratio, [("品川", (0.25, 0.5))]).unwrap();
        let p = registry.resolve("品川", 800, 600).unwrap();
        assert_eq!(p, Point { x: 200.0, y: 300.0 });
        assert_eq!(registry.marker_radius(20, 800, 600), 20);
    }

    #[test]
    fn test_ratio_rejects_out_of_range() {
        let result = StationRegistry::new(Coordinates::Ratio, [("品川", (1.5, 0.5))]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pixel_rejects_zero_reference() {
        let result = StationRegistry::new(
            Coordinates::Pixel {
                reference_width: 0,
                reference_height: 100,
            },
            [("品川", (1.0, 1.0))],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_station_does_not_resolve() {
        let registry = pixel_registry();
        assert!(registry.resolve("名古屋", 1000, 1000).is_none());
        assert!(!registry.contains("名古屋"));
    }

    #[test]
    fn test_canonical_name() {
        let registry = pixel_registry();
        assert_eq!(registry.canonical_name("渋谷"), Some("渋谷"));
        assert_eq!(registry.canonical_name("  渋谷\n"), Some("渋谷"));
        assert_eq!(registry.canonical_name("渋谷駅"), Some("渋谷"));
        assert_eq!(registry.canonical_name("駅"), None);
        assert_eq!(registry.canonical_name("名古屋駅"), None);
    }

    #[test]
    fn test_exact_key_with_suffix_wins() {
        let registry = StationRegistry::new(
            Coordinates::Ratio,
            [("東京駅", (0.1, 0.1)), ("東京", (0.9, 0.9))],
        )
        .unwrap();
        assert_eq!(registry.canonical_name("東京駅"), Some("東京駅"));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "coordinates": { "kind": "pixel", "reference_width": 1200, "reference_height": 900 },
            "stations": { "渋谷": [100, 120], "大手町": [640.5, 300] }
        }"#;
        let registry = StationRegistry::from_json(json, Path::new("stations.json")).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.coordinates(),
            Coordinates::Pixel {
                reference_width: 1200,
                reference_height: 900
            }
        );
        assert_eq!(
            registry.resolve("大手町", 1200, 900),
            Some(Point { x: 640.5, y: 300.0 })
        );
    }

    #[test]
    fn test_from_json_ratio() {
        let json = r#"{ "coordinates": { "kind": "ratio" }, "stations": { "上野": [0.5, 0.25] } }"#;
        let registry = StationRegistry::from_json(json, Path::new("stations.json")).unwrap();
        assert_eq!(registry.coordinates(), Coordinates::Ratio);
        assert!(registry.contains("上野"));
    }

    #[test]
    fn test_from_json_malformed() {
        let err = StationRegistry::from_json("{ nope", Path::new("stations.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
