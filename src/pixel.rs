// ============================================================================
// PIXEL — BGRA sample and channel selection
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One 8-bit-per-channel pixel.
///
/// Field order matches the in-memory byte order of a [`Surface`](crate::canvas::Surface):
/// blue, green, red, alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct ColorBgra {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

impl ColorBgra {
    pub const WHITE: ColorBgra = ColorBgra { b: 255, g: 255, r: 255, a: 255 };
    pub const TRANSPARENT: ColorBgra = ColorBgra { b: 0, g: 0, r: 0, a: 0 };

    #[inline]
    pub const fn from_bgra(b: u8, g: u8, r: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    #[inline]
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    /// Bytes in storage order (B, G, R, A).
    #[inline]
    pub const fn to_bgra_bytes(self) -> [u8; 4] {
        [self.b, self.g, self.r, self.a]
    }

    #[inline]
    pub const fn to_rgba_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<image::Rgba<u8>> for ColorBgra {
    #[inline]
    fn from(px: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = px.0;
        Self::from_rgba(r, g, b, a)
    }
}

impl From<ColorBgra> for image::Rgba<u8> {
    #[inline]
    fn from(px: ColorBgra) -> Self {
        image::Rgba(px.to_rgba_bytes())
    }
}

// ============================================================================
// CHANNEL SELECTOR
// ============================================================================

/// Which channel of a source image a slot samples.
///
/// The numeric values (`Blue = 0` … `Alpha = 3`) are the persisted/legacy
/// encoding only; sampling always goes through [`extract_channel`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelSelector {
    Blue = 0,
    Green = 1,
    #[default]
    Red = 2,
    Alpha = 3,
}

impl ChannelSelector {
    pub fn all() -> &'static [ChannelSelector] {
        &[
            ChannelSelector::Blue,
            ChannelSelector::Green,
            ChannelSelector::Red,
            ChannelSelector::Alpha,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChannelSelector::Blue => "blue",
            ChannelSelector::Green => "green",
            ChannelSelector::Red => "red",
            ChannelSelector::Alpha => "alpha",
        }
    }

    pub fn to_index(&self) -> u8 {
        match self {
            ChannelSelector::Blue => 0,
            ChannelSelector::Green => 1,
            ChannelSelector::Red => 2,
            ChannelSelector::Alpha => 3,
        }
    }

    /// Decode the legacy numeric value. Out-of-range values yield `None`.
    pub fn from_index(v: u8) -> Option<Self> {
        match v {
            0 => Some(ChannelSelector::Blue),
            1 => Some(ChannelSelector::Green),
            2 => Some(ChannelSelector::Red),
            3 => Some(ChannelSelector::Alpha),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ChannelSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "b" | "blue" | "0" => Ok(ChannelSelector::Blue),
            "g" | "green" | "1" => Ok(ChannelSelector::Green),
            "r" | "red" | "2" => Ok(ChannelSelector::Red),
            "a" | "alpha" | "3" => Ok(ChannelSelector::Alpha),
            other => Err(format!(
                "unknown channel '{}' (expected blue, green, red or alpha)",
                other
            )),
        }
    }
}

/// Return the selected channel of `px`, verbatim.
#[inline(always)]
pub fn extract_channel(px: ColorBgra, channel: ChannelSelector) -> u8 {
    match channel {
        ChannelSelector::Blue => px.b,
        ChannelSelector::Green => px.g,
        ChannelSelector::Red => px.r,
        ChannelSelector::Alpha => px.a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_channel_picks_named_field() {
        let px = ColorBgra::from_rgba(10, 20, 30, 40);
        assert_eq!(extract_channel(px, ChannelSelector::Red), 10);
        assert_eq!(extract_channel(px, ChannelSelector::Green), 20);
        assert_eq!(extract_channel(px, ChannelSelector::Blue), 30);
        assert_eq!(extract_channel(px, ChannelSelector::Alpha), 40);
    }

    #[test]
    fn storage_order_is_bgra() {
        let px = ColorBgra::from_rgba(1, 2, 3, 4);
        assert_eq!(px.to_bgra_bytes(), [3, 2, 1, 4]);
        assert_eq!(px.to_rgba_bytes(), [1, 2, 3, 4]);
    }

    #[test]
    fn legacy_index_encoding() {
        for sel in ChannelSelector::all() {
            assert_eq!(ChannelSelector::from_index(sel.to_index()), Some(*sel));
        }
        assert_eq!(ChannelSelector::from_index(0), Some(ChannelSelector::Blue));
        assert_eq!(ChannelSelector::from_index(3), Some(ChannelSelector::Alpha));
        assert_eq!(ChannelSelector::from_index(4), None);
    }

    #[test]
    fn default_selector_is_red() {
        assert_eq!(ChannelSelector::default(), ChannelSelector::Red);
    }

    #[test]
    fn parse_channel_names() {
        assert_eq!("Blue".parse::<ChannelSelector>(), Ok(ChannelSelector::Blue));
        assert_eq!(" a ".parse::<ChannelSelector>(), Ok(ChannelSelector::Alpha));
        assert!("cyan".parse::<ChannelSelector>().is_err());
    }

    #[test]
    fn image_rgba_conversion() {
        let px: ColorBgra = image::Rgba([9, 8, 7, 6]).into();
        assert_eq!(px, ColorBgra::from_bgra(7, 8, 9, 6));
        let back: image::Rgba<u8> = px.into();
        assert_eq!(back.0, [9, 8, 7, 6]);
    }
}
