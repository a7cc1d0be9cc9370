use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Lowest and highest dancefloor energy level.
pub const ENERGY_MIN: u8 = 1;
pub const ENERGY_MAX: u8 = 5;

/// Closed set of root genres a track can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MainGenre {
    Urban,
    ShattaBouyon,
    Electronic,
    OpenFormat,
    Latino,
    DiscoFunk,
    Oldies,
}

impl MainGenre {
    pub const ALL: &'static [MainGenre] = &[
        Self::Urban,
        Self::ShattaBouyon,
        Self::Electronic,
        Self::OpenFormat,
        Self::Latino,
        Self::DiscoFunk,
        Self::Oldies,
    ];

    /// Wire name, as the service is told to emit it.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Urban => "URBAN",
            Self::ShattaBouyon => "SHATTA_BOUYON",
            Self::Electronic => "ELECTRONIC",
            Self::OpenFormat => "OPEN_FORMAT",
            Self::Latino => "LATINO",
            Self::DiscoFunk => "DISCO_FUNK",
            Self::Oldies => "OLDIES",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Urban => "Current hip-hop, US/FR rap, RnB, drill, trap, afro-urban",
            Self::ShattaBouyon => {
                "Shatta, bouyon, fast dancehall in the Antilles/Reunion/Guyana style"
            }
            Self::Electronic => "House, tech house, EDM, trance",
            Self::OpenFormat => "Pop, variety, radio hits, rock, commercial latin pop",
            Self::Latino => "Reggaeton, moombahton, baile funk, perreo (not commercial pop)",
            Self::DiscoFunk => "Disco, funk, soul, nu-disco",
            Self::Oldies => "80s, 90s, classic rock",
        }
    }
}

impl fmt::Display for MainGenre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One classified track, as returned by the service and stored in checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Input filename, echoed back verbatim. Join key between input and output.
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artist: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    pub main_genre: MainGenre,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sub_genre: String,
    #[serde(deserialize_with = "whole_number")]
    pub energy_level: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vibe_tags: Vec<String>,
    /// Any other fields the service sent (e.g. `bpm`), kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `null` reads as the field's empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Integer, or a float with no fractional part (`4.0`). Range is checked in `validate`.
fn whole_number<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let n = Number::deserialize(deserializer)?;
    n.as_u64()
        .or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u8::MAX))
                .map(|f| f as u64)
        })
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| de::Error::custom(format!("energy_level {n} is not a whole number")))
}

impl TrackRecord {
    /// Check the invariants serde can't express on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.filename.trim().is_empty() {
            return Err("empty filename".into());
        }
        if !(ENERGY_MIN..=ENERGY_MAX).contains(&self.energy_level) {
            return Err(format!(
                "energy_level {} outside {ENERGY_MIN}-{ENERGY_MAX}",
                self.energy_level
            ));
        }
        Ok(())
    }
}

/// Instruction text sent with every batch unless the config points at a file.
pub fn default_instructions() -> String {
    let genres: String = MainGenre::ALL
        .iter()
        .map(|g| format!("    - **{}** ({}).\n", g.code(), g.description()))
        .collect();

    format!(
        r#"You are a music expert and a professional resident DJ in major clubs. Your job is to file music files into a DJ library (Serato) with extreme precision.

SORTING RULES (DJ LOGIC):

1.  **GENRE LOGIC (the root):**
    Pick exactly ONE main genre from this strict list:
{genres}
    IMPORTANT EXCEPTION (CLUB JURISPRUDENCE): if a track dates from the 2000s-2010s but is still played in clubs today as a current banger (e.g. Flo Rida "Low", 50 Cent "In Da Club", Usher "Yeah", David Guetta), file it under "URBAN" or "OPEN_FORMAT", NOT "OLDIES". Keep OLDIES for tracks that genuinely sound retro/nostalgic.

2.  **SUB-GENRE LOGIC:**
    Be precise (e.g. "Drill FR", "Zouk", "French Touch", "Jersey Club").

3.  **GOLDEN RULE OF ENERGY (level {min}-{max}) - DANCEFLOOR IMPACT:**
    Do not judge energy on BPM alone. Judge the crowd's reaction.
    - Level 5 (peak time/banger): a track that makes people scream and rush the floor. A viral hit is a 5 even at a slow tempo. Cultural impact beats speed.
    - Level 3 (groove): people dance, it flows, but no explosion.
    - Level 1 (chill): ambient music or a very calm warm-up.

TECHNICAL RULES (JSON FORMAT):

1.  **NO SUMMARIES:** handle EVERY entry of the list one by one. Never summarise.
2.  **MANDATORY STRUCTURE:** return a JSON object with a single key "tracks" holding the list of objects.
3.  **FILENAME:** copy the "filename" you received exactly. Never modify it.

Expected output:
{{
  "tracks": [
    {{
      "filename": "Exact filename received (DO NOT MODIFY)",
      "artist": "Corrected artist",
      "title": "Corrected title",
      "main_genre": "MAIN_GENRE",
      "sub_genre": "Precise sub-genre",
      "energy_level": 5,
      "vibe_tags": ["Viral", "Hit", "Club"]
    }}
  ]
}}
"#,
        min = ENERGY_MIN,
        max = ENERGY_MAX,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_wire_names() {
        let json = r#""SHATTA_BOUYON""#;
        let g: MainGenre = serde_json::from_str(json).unwrap();
        assert_eq!(g, MainGenre::ShattaBouyon);
        assert_eq!(serde_json::to_string(&MainGenre::OpenFormat).unwrap(), r#""OPEN_FORMAT""#);
        for g in MainGenre::ALL {
            assert_eq!(serde_json::to_string(g).unwrap(), format!("\"{}\"", g.code()));
        }
    }

    #[test]
    fn test_unknown_genre_rejected() {
        let json = r#"{"filename": "a.mp3", "main_genre": "POLKA", "energy_level": 3}"#;
        assert!(serde_json::from_str::<TrackRecord>(json).is_err());
    }

    #[test]
    fn test_track_record_defaults() {
        let json = r#"{"filename": "a.mp3", "main_genre": "URBAN", "energy_level": 5}"#;
        let t: TrackRecord = serde_json::from_str(json).unwrap();
        assert_eq!(t.artist, "");
        assert!(t.vibe_tags.is_empty());
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_null_fields_and_float_energy_accepted() {
        let json = r#"{"filename": "a.mp3", "artist": null, "title": null, "main_genre": "URBAN",
                       "sub_genre": null, "energy_level": 4.0, "vibe_tags": null, "bpm": 128}"#;
        let t: TrackRecord = serde_json::from_str(json).unwrap();
        assert_eq!(t.artist, "");
        assert_eq!(t.sub_genre, "");
        assert!(t.vibe_tags.is_empty());
        assert_eq!(t.energy_level, 4);
        assert_eq!(t.extra["bpm"], 128);
        assert!(t.validate().is_ok());

        // Extra fields survive a write/read cycle
        let back = serde_json::to_value(&t).unwrap();
        assert_eq!(back["bpm"], 128);
    }

    #[test]
    fn test_fractional_energy_rejected() {
        let json = r#"{"filename": "a.mp3", "main_genre": "URBAN", "energy_level": 3.5}"#;
        assert!(serde_json::from_str::<TrackRecord>(json).is_err());
        let json = r#"{"filename": "a.mp3", "main_genre": "URBAN", "energy_level": "high"}"#;
        assert!(serde_json::from_str::<TrackRecord>(json).is_err());
    }

    #[test]
    fn test_energy_out_of_range() {
        let mut t: TrackRecord = serde_json::from_str(
            r#"{"filename": "a.mp3", "main_genre": "OLDIES", "energy_level": 0}"#,
        )
        .unwrap();
        assert!(t.validate().is_err());
        t.energy_level = 6;
        assert!(t.validate().is_err());
        t.energy_level = 1;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_default_instructions_list_every_genre() {
        let text = default_instructions();
        for g in MainGenre::ALL {
            assert!(text.contains(g.code()), "missing {g}");
        }
        assert!(text.contains(r#""tracks": ["#));
    }
}
