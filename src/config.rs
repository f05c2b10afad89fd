// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Skip webhook signature checks and log replies instead of sending them.
    pub local_mode: bool,
    pub channel_secret: Option<String>,
    pub channel_access_token: Option<String>,
    pub imgbb_api_key: Option<String>,
    /// Reference map image.
    pub map_image: PathBuf,
    /// Station position table (JSON).
    pub stations_file: PathBuf,
    /// Optional team/color table (JSON).
    pub teams_file: Option<PathBuf>,
    /// Distinct participants needed before a batch is rendered.
    pub required_participants: usize,
    /// Whether a participant may re-report to move their pin.
    pub allow_report_updates: bool,
    pub marker_radius: u32,
    pub marker_outline_width: u32,
    /// Size the composed image is produced at, if not the asset's own.
    pub output_size: Option<(u32, u32)>,
    pub upload_max_attempts: u32,
}

impl Config {
    /// Load configuration from the process environment and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 8080)
    /// - `TETSUONI_LOCAL_MODE` - `true`/`1` to enable local mode
    /// - `LINE_CHANNEL_SECRET`, `LINE_CHANNEL_ACCESS_TOKEN` - required outside local mode
    /// - `IMGBB_API_KEY` - image host key
    /// - `MAP_IMAGE` - reference map (default: `Rosenzu.png`)
    /// - `STATIONS_FILE` - station table (default: `data/stations.json`)
    /// - `TEAMS_FILE` - team table (optional)
    /// - `REQUIRED_PARTICIPANTS` - quorum, at least 1 (default: 1)
    /// - `ALLOW_REPORT_UPDATES` - default `true`
    /// - `MARKER_RADIUS` - at least 1 (default: 20)
    /// - `MARKER_OUTLINE_WIDTH` - 0 disables the outline (default: 4)
    /// - `OUTPUT_SIZE` - `WIDTHxHEIGHT` (optional)
    /// - `UPLOAD_MAX_ATTEMPTS` - at least 1 (default: 3)
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a configuration from explicit arguments and a variable lookup.
    pub fn from_sources<F>(args: &[String], env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = match Self::parse_cli_value(args, "--port").or_else(|| var("PORT")) {
            Some(v) => parse_number("PORT", &v)?,
            None => 8080,
        };

        let local_mode = args.iter().any(|a| a == "--local")
            || match var("TETSUONI_LOCAL_MODE") {
                Some(v) => parse_bool("TETSUONI_LOCAL_MODE", &v)?,
                None => false,
            };

        let channel_secret = var("LINE_CHANNEL_SECRET");
        let channel_access_token = var("LINE_CHANNEL_ACCESS_TOKEN");
        if !local_mode {
            if channel_secret.is_none() {
                return Err(ConfigError::Missing("LINE_CHANNEL_SECRET"));
            }
            if channel_access_token.is_none() {
                return Err(ConfigError::Missing("LINE_CHANNEL_ACCESS_TOKEN"));
            }
        }

        let required_participants: usize = match var("REQUIRED_PARTICIPANTS") {
            Some(v) => parse_number("REQUIRED_PARTICIPANTS", &v)?,
            None => 1,
        };
        if required_participants == 0 {
            return Err(ConfigError::invalid("REQUIRED_PARTICIPANTS", "must be at least 1"));
        }

        let marker_radius: u32 = match var("MARKER_RADIUS") {
            Some(v) => parse_number("MARKER_RADIUS", &v)?,
            None => 20,
        };
        if marker_radius == 0 {
            return Err(ConfigError::invalid("MARKER_RADIUS", "must be at least 1"));
        }

        let upload_max_attempts: u32 = match var("UPLOAD_MAX_ATTEMPTS") {
            Some(v) => parse_number("UPLOAD_MAX_ATTEMPTS", &v)?,
            None => 3,
        };
        if upload_max_attempts == 0 {
            return Err(ConfigError::invalid("UPLOAD_MAX_ATTEMPTS", "must be at least 1"));
        }

        Ok(Config {
            port,
            local_mode,
            channel_secret,
            channel_access_token,
            imgbb_api_key: var("IMGBB_API_KEY"),
            map_image: var("MAP_IMAGE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("Rosenzu.png")),
            stations_file: var("STATIONS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/stations.json")),
            teams_file: var("TEAMS_FILE").map(PathBuf::from),
            required_participants,
            allow_report_updates: match var("ALLOW_REPORT_UPDATES") {
                Some(v) => parse_bool("ALLOW_REPORT_UPDATES", &v)?,
                None => true,
            },
            marker_radius,
            marker_outline_width: match var("MARKER_OUTLINE_WIDTH") {
                Some(v) => parse_number("MARKER_OUTLINE_WIDTH", &v)?,
                None => 4,
            },
            output_size: var("OUTPUT_SIZE")
                .map(|v| parse_size("OUTPUT_SIZE", &v))
                .transpose()?,
            upload_max_attempts,
        })
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(name, format!("'{value}': {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(name, format!("'{value}' is not a boolean"))),
    }
}

/// Parse `WIDTHxHEIGHT`, both non-zero.
fn parse_size(name: &str, value: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::invalid(name, format!("'{value}' is not WIDTHxHEIGHT"));
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(invalid)?;
    let w: u32 = w.trim().parse().map_err(|_| invalid())?;
    let h: u32 = h.trim().parse().map_err(|_| invalid())?;
    if w == 0 || h == 0 {
        return Err(invalid());
    }
    Ok((w, h))
}
