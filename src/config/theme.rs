//! Named palettes of the embedded editor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Theme {
    /// Follows the host's light/dark setting.
    #[default]
    #[serde(rename = "automatic")]
    Automatic,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "atlas")]
    Atlas,
    #[serde(rename = "dark")]
    Dark,
    #[serde(rename = "Kennedy")]
    Kennedy,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Self::Automatic,
        Self::Min,
        Self::Atlas,
        Self::Dark,
        Self::Kennedy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Min => "min",
            Self::Atlas => "atlas",
            Self::Dark => "dark",
            Self::Kennedy => "Kennedy",
        }
    }

    /// Candidate list for the theme picker, `current` first.
    pub fn candidates(current: Theme) -> Vec<Theme> {
        std::iter::once(current)
            .chain(Self::ALL.into_iter().filter(|t| *t != current))
            .collect()
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown theme '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_start_with_current() {
        let candidates = Theme::candidates(Theme::Dark);
        assert_eq!(candidates[0], Theme::Dark);
        assert_eq!(candidates.len(), Theme::ALL.len());
        assert_eq!(candidates.iter().filter(|t| **t == Theme::Dark).count(), 1);
    }

    #[test]
    fn test_parse_theme_names() {
        assert_eq!("kennedy".parse::<Theme>(), Ok(Theme::Kennedy));
        assert_eq!("atlas".parse::<Theme>(), Ok(Theme::Atlas));
        assert!("solarized".parse::<Theme>().is_err());
    }
}
