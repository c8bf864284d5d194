//! Modes de lecture AVTransport et drapeaux du lecteur.

use std::fmt;
use std::str::FromStr;

/// Mode `CurrentPlayMode` d'AVTransport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Normal,
    Shuffle,
    RepeatOne,
    RepeatAll,
    Random,
    Direct1,
}

/// Drapeaux (repeat, random, single) du lecteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayFlags {
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
}

impl PlayMode {
    pub const ALL: [PlayMode; 6] = [
        PlayMode::Normal,
        PlayMode::Shuffle,
        PlayMode::RepeatOne,
        PlayMode::RepeatAll,
        PlayMode::Random,
        PlayMode::Direct1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlayMode::Normal => "NORMAL",
            PlayMode::Shuffle => "SHUFFLE",
            PlayMode::RepeatOne => "REPEAT_ONE",
            PlayMode::RepeatAll => "REPEAT_ALL",
            PlayMode::Random => "RANDOM",
            PlayMode::Direct1 => "DIRECT_1",
        }
    }

    pub fn flags(self) -> PlayFlags {
        let (repeat, random, single) = match self {
            PlayMode::Normal => (false, false, false),
            PlayMode::Shuffle => (false, true, false),
            PlayMode::RepeatOne => (true, false, true),
            PlayMode::RepeatAll => (true, false, false),
            PlayMode::Random => (true, true, false),
            PlayMode::Direct1 => (false, false, true),
        };
        PlayFlags {
            repeat,
            random,
            single,
        }
    }

    /// Mode correspondant aux drapeaux ; `None` pour random + single, qui
    /// n'a pas d'équivalent.
    pub fn from_flags(flags: PlayFlags) -> Option<PlayMode> {
        PlayMode::ALL.into_iter().find(|mode| mode.flags() == flags)
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown play mode {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_for_defined_modes() {
        for mode in PlayMode::ALL {
            assert_eq!(PlayMode::from_flags(mode.flags()), Some(mode));
            assert_eq!(mode.as_str().parse::<PlayMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_random_single_is_rejected() {
        for repeat in [false, true] {
            let flags = PlayFlags {
                repeat,
                random: true,
                single: true,
            };
            assert_eq!(PlayMode::from_flags(flags), None);
        }
        assert!("REPEAT_TRACK".parse::<PlayMode>().is_err());
    }
}
