// Team assignments: participant identity -> team label -> marker color.

use std::collections::HashMap;
use std::path::Path;

use image::Rgb;
use serde::Deserialize;

use crate::error::ConfigError;

/// Marker color for participants without a team.
pub const DEFAULT_COLOR: Rgb<u8> = Rgb([220, 20, 60]);

#[derive(Debug, Deserialize)]
struct TeamsFile {
    #[serde(default)]
    default_color: Option<String>,
    #[serde(default)]
    teams: HashMap<String, TeamEntry>,
}

#[derive(Debug, Deserialize)]
struct TeamEntry {
    color: String,
    #[serde(default)]
    members: Vec<String>,
}

/// Static team table. Looked up per render, never mutated after load.
#[derive(Debug, Clone)]
pub struct TeamAssignments {
    /// participant id -> team label
    members: HashMap<String, String>,
    /// team label -> color
    palette: HashMap<String, Rgb<u8>>,
    default_color: Rgb<u8>,
}

impl Default for TeamAssignments {
    fn default() -> Self {
        Self {
            members: HashMap::new(),
            palette: HashMap::new(),
            default_color: DEFAULT_COLOR,
        }
    }
}

impl TeamAssignments {
    pub fn new(default_color: Rgb<u8>) -> Self {
        Self {
            default_color,
            ..Self::default()
        }
    }

    /// Register a team and its members. A participant listed twice keeps the last team.
    pub fn add_team<I, S>(&mut self, label: &str, color: Rgb<u8>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.palette.insert(label.to_string(), color);
        for member in members {
            self.members.insert(member.into(), label.to_string());
        }
    }

    pub fn from_json(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: TeamsFile =
            serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let default_color = match file.default_color {
            Some(hex) => parse_hex_color(&hex)
                .ok_or_else(|| ConfigError::invalid("default_color", format!("'{hex}'")))?,
            None => DEFAULT_COLOR,
        };

        let mut teams = Self::new(default_color);
        // Sorted so duplicate membership resolves the same way on every start.
        let mut entries: Vec<_> = file.teams.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (label, entry) in entries {
            let color = parse_hex_color(&entry.color).ok_or_else(|| {
                ConfigError::invalid(format!("team '{label}' color"), format!("'{}'", entry.color))
            })?;
            teams.add_team(&label, color, entry.members);
        }
        Ok(teams)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents, path)
    }

    pub fn team_of(&self, participant: &str) -> Option<&str> {
        self.members.get(participant).map(String::as_str)
    }

    pub fn color_for(&self, participant: &str) -> Rgb<u8> {
        self.team_of(participant)
            .and_then(|team| self.palette.get(team))
            .copied()
            .unwrap_or(self.default_color)
    }
}

/// Parse `#rrggbb` (the `#` is optional).
pub fn parse_hex_color(s: &str) -> Option<Rgb<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
