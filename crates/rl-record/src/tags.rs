//! Header tags of the DAQ control and physics records

use serde::{Deserialize, Serialize};

/// Sync control record
pub const SYNC_TAG: u16 = 16;
/// Prestart control record, opens a run
pub const PRESTART_TAG: u16 = 17;
/// Go control record
pub const GO_TAG: u16 = 18;
/// Pause control record
pub const PAUSE_TAG: u16 = 19;
/// End control record, closes a run
pub const END_TAG: u16 = 20;

/// Bank holding the trigger's event number as its first word
pub const EVENT_ID_BANK_TAG: u16 = 0xC000;

/// Default inclusive range of physics record tags
pub const PHYSICS_TAG_MIN: u16 = 1;
pub const PHYSICS_TAG_MAX: u16 = 15;

/// Named control records of the transport stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlTag {
    Sync,
    Prestart,
    Go,
    Pause,
    End,
}

impl ControlTag {
    /// Resolve a header tag into a control record, if it is one
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            SYNC_TAG => Some(Self::Sync),
            PRESTART_TAG => Some(Self::Prestart),
            GO_TAG => Some(Self::Go),
            PAUSE_TAG => Some(Self::Pause),
            END_TAG => Some(Self::End),
            _ => None,
        }
    }

    pub fn tag(&self) -> u16 {
        match self {
            Self::Sync => SYNC_TAG,
            Self::Prestart => PRESTART_TAG,
            Self::Go => GO_TAG,
            Self::Pause => PAUSE_TAG,
            Self::End => END_TAG,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sync => "SYNC",
            Self::Prestart => "PRESTART",
            Self::Go => "GO",
            Self::Pause => "PAUSE",
            Self::End => "END",
        }
    }
}

impl std::fmt::Display for ControlTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.tag())
    }
}
