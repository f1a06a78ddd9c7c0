/// Subscription flows
///
/// A flow is an independent message universe. Entity keys are only unique
/// within one flow, so every registry and handler lookup is scoped by it.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flow {
    InPlay,
    PreMatch,
}

impl Flow {
    pub const ALL: [Flow; 2] = [Flow::InPlay, Flow::PreMatch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::InPlay => "inplay",
            Flow::PreMatch => "prematch",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flow {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inplay" | "in-play" | "in_play" | "live" => Ok(Flow::InPlay),
            "prematch" | "pre-match" | "pre_match" | "pre-event" => Ok(Flow::PreMatch),
            _ => Err(ConfigError::UnknownFlow(s.to_string())),
        }
    }
}
