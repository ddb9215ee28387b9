//! Sound module kinds and their replicated fields

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::TandemError;

/// Every kind of sound module a client can activate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    PhysicsBubble,
    SoundBlock,
    TempoCursor,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 3] = [Self::PhysicsBubble, Self::SoundBlock, Self::TempoCursor];

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhysicsBubble => "PhysicsBubble",
            Self::SoundBlock => "SoundBlock",
            Self::TempoCursor => "TempoCursor",
        }
    }

    /// Replicated fields
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::PhysicsBubble => &["color", "pitch", "timbre", "bounces"],
            Self::SoundBlock => &["color", "pitch", "timbre", "instrument"],
            Self::TempoCursor => &["touch_points", "delete_mode", "tempo"],
        }
    }

    /// Fields holding one value for the whole room, stored under
    /// [`ClientId::room`](crate::state::ClientId::room) instead of per client
    pub fn is_room_field(&self, field: &str) -> bool {
        matches!((self, field), (Self::TempoCursor, "tempo"))
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    /// Value seeded for a newly joined client, `None` for unknown fields
    pub fn default_value(&self, field: &str) -> Option<Value> {
        let value = match (self, field) {
            (Self::PhysicsBubble | Self::SoundBlock, "color") => palette::VIOLET.to_value(),
            (Self::PhysicsBubble | Self::SoundBlock, "pitch") => json!(DEFAULT_PITCH),
            (Self::PhysicsBubble | Self::SoundBlock, "timbre") => json!("sine"),
            (Self::PhysicsBubble, "bounces") => json!(DEFAULT_BOUNCES),
            (Self::SoundBlock, "instrument") => json!(Instrument::Piano.name()),
            (Self::TempoCursor, "touch_points") => json!([]),
            (Self::TempoCursor, "delete_mode") => json!(false),
            (Self::TempoCursor, "tempo") => json!(DEFAULT_TEMPO),
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModuleKind {
    type Err = TandemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| TandemError::UnknownModule(s.to_string()))
    }
}

pub const DEFAULT_PITCH: u8 = 60;
pub const DEFAULT_BOUNCES: u32 = 5;

/// Room tempo for cursors, in bpm
pub const DEFAULT_TEMPO: f64 = 60.0;
/// How much one tempo nudge raises the room tempo
pub const TEMPO_STEP: f64 = 4.0;

/// Pitch choices offered by the pitch selector (C major, one octave)
pub const PITCHES: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];

/// Normalized RGB color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    const fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    pub fn to_value(self) -> Value {
        json!([self.0, self.1, self.2])
    }
}

/// Shared module color palette
pub mod palette {
    use super::Rgb;

    pub const RED: Rgb = Rgb::from_u8(201, 108, 130);
    pub const ORANGE: Rgb = Rgb::from_u8(214, 152, 142);
    pub const YELLOW: Rgb = Rgb::from_u8(238, 234, 202);
    pub const GREEN: Rgb = Rgb::from_u8(170, 220, 206);
    pub const TEAL: Rgb = Rgb::from_u8(159, 187, 208);
    pub const BLUE: Rgb = Rgb::from_u8(44, 85, 123);
    pub const INDIGO: Rgb = Rgb::from_u8(46, 40, 90);
    pub const VIOLET: Rgb = Rgb::from_u8(147, 127, 159);
    pub const WHITE: Rgb = Rgb::from_u8(239, 226, 222);

    pub fn by_name(name: &str) -> Option<Rgb> {
        let color = match name {
            "red" => RED,
            "orange" => ORANGE,
            "yellow" => YELLOW,
            "green" => GREEN,
            "teal" => TEAL,
            "blue" => BLUE,
            "indigo" => INDIGO,
            "violet" => VIOLET,
            "white" => WHITE,
            _ => return None,
        };
        Some(color)
    }
}

/// SoundBlock instruments, one synth channel each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Piano,
    Violin,
    Trumpet,
    Ocarina,
    Choir,
}

impl Instrument {
    pub const ALL: [Instrument; 5] = [
        Self::Piano,
        Self::Violin,
        Self::Trumpet,
        Self::Ocarina,
        Self::Choir,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Piano => "piano",
            Self::Violin => "violin",
            Self::Trumpet => "trumpet",
            Self::Ocarina => "ocarina",
            Self::Choir => "choir",
        }
    }

    /// General MIDI program number
    pub fn program(&self) -> u8 {
        match self {
            Self::Piano => 1,
            Self::Violin => 41,
            Self::Trumpet => 57,
            Self::Ocarina => 80,
            Self::Choir => 53,
        }
    }

    pub fn channel(&self) -> u8 {
        Self::ALL.iter().position(|i| i == self).unwrap_or(0) as u8
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.name() == name)
    }
}
