//! Literal color values.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;

/// A hex color value such as `#FF0000`.
///
/// Accepted forms are `#RGB`, `#RGBA`, `#RRGGBB` and `#RRGGBBAA`. Hex
/// digits are normalized to upper case so `#ff0000` and `#FF0000` are the
/// same palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Color(String);

impl Color {
    /// Parses and normalizes a color string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidColor`] if the string is not a hex color.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let digits = raw
            .strip_prefix('#')
            .ok_or_else(|| CoreError::InvalidColor(raw.to_string()))?;

        let valid_len = matches!(digits.len(), 3 | 4 | 6 | 8);
        if !valid_len || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidColor(raw.to_string()));
        }

        Ok(Self(format!("#{}", digits.to_ascii_uppercase())))
    }

    /// Returns the normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the color, returning its string form.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for Color {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Color {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
