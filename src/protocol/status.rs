//! Status code decoding.
//!
//! The status characteristic reports the lock's indicator as a single
//! ASCII character.

/// Indicator color reported by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndicatorColor {
    /// Neutral state: no data, or an unrecognized code.
    #[default]
    White,
    /// Status code `B`.
    Blue,
    /// Status code `R`.
    Red,
    /// Status code `G`.
    Green,
}

impl IndicatorColor {
    /// Map a single status code byte. Unknown codes map to [`IndicatorColor::White`].
    pub fn from_code(code: u8) -> Self {
        match code {
            b'B' => Self::Blue,
            b'R' => Self::Red,
            b'G' => Self::Green,
            _ => Self::White,
        }
    }

    /// Map a decoded status payload.
    ///
    /// Only a payload of exactly one known code byte yields a color.
    pub fn from_payload(raw: &[u8]) -> Self {
        match raw {
            [code] => Self::from_code(*code),
            _ => Self::White,
        }
    }

    /// Get the color name as a lowercase string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Green => "green",
        }
    }
}

impl std::fmt::Display for IndicatorColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
