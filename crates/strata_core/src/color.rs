//! Color types and utilities

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while_m_n},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map_opt},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded},
    IResult,
};

/// RGBA color with f32 components (0.0 to 1.0)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const RED: Color = Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Create from u8 components (0-255)
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Create from style channels: r, g, b in 0-255 and an optional alpha in 0-1
    pub fn from_components(channels: &[f64]) -> Option<Self> {
        match *channels {
            [r, g, b] => Some(Self::from_channels(r, g, b, 1.0)),
            [r, g, b, a] => Some(Self::from_channels(r, g, b, a)),
            _ => None,
        }
    }

    /// Same conversion the `color` operator performs (no clamping)
    pub fn from_channels(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: (r / 255.0) as f32,
            g: (g / 255.0) as f32,
            b: (b / 255.0) as f32,
            a: a as f32,
        }
    }

    /// Parse a CSS-like color string.
    ///
    /// Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)`,
    /// `rgba(r, g, b, a)` and a handful of named colors.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let parsed: IResult<&str, Color> = all_consuming(alt((hex_color, functional_color)))(input);
        match parsed {
            Ok((_, color)) => Some(color),
            Err(_) => named_color(input),
        }
    }

    /// Set alpha and return new color
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { a: alpha, ..self }
    }

    /// Convert to u8 array [r, g, b, a], rounding to the nearest step
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_array(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }

    /// Per-channel linear blend, `t` is not clamped
    pub fn mix(self, other: Color, t: f32) -> Self {
        Self {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }

    /// Pack into two 16-bit words, two 8-bit channels per word.
    ///
    /// Word values stay below 2^16 so they are exact in an f32 vertex slot.
    pub fn pack(&self) -> [f32; 2] {
        let [r, g, b, a] = self.to_rgba8();
        [
            (r as u32 * 256 + g as u32) as f32,
            (b as u32 * 256 + a as u32) as f32,
        ]
    }

    /// Inverse of [`Color::pack`]; mirrors `unpack_color` in generated shaders
    pub fn unpack(packed: [f32; 2]) -> Self {
        let hi0 = (packed[0] / 256.0).floor();
        let hi1 = (packed[1] / 256.0).floor();
        Self {
            r: hi0 / 255.0,
            g: (packed[0] - hi0 * 256.0) / 255.0,
            b: hi1 / 255.0,
            a: (packed[1] - hi1 * 256.0) / 255.0,
        }
    }
}

// ============================================================================
// Color grammar
// ============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// `#` followed by 3, 4, 6 or 8 hex digits
fn hex_color(input: &str) -> IResult<&str, Color> {
    map_opt(
        preceded(char('#'), take_while_m_n(3, 8, |c: char| c.is_ascii_hexdigit())),
        hex_digits_to_color,
    )(input)
}

fn hex_digits_to_color(hex: &str) -> Option<Color> {
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

    match hex.len() {
        3 => Some(Color::from_rgba8(nibble(0)?, nibble(1)?, nibble(2)?, 255)),
        4 => Some(Color::from_rgba8(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
        6 => Some(Color::from_rgba8(byte(0)?, byte(2)?, byte(4)?, 255)),
        8 => Some(Color::from_rgba8(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

/// `rgb(r, g, b)` or `rgba(r, g, b, a)`, channels 0-255 and alpha 0-1
fn functional_color(input: &str) -> IResult<&str, Color> {
    map_opt(
        preceded(
            alt((tag_no_case("rgba"), tag_no_case("rgb"))),
            delimited(ws(char('(')), separated_list1(char(','), ws(double)), char(')')),
        ),
        |channels: Vec<f64>| Color::from_components(&channels),
    )(input)
}

fn named_color(name: &str) -> Option<Color> {
    match name.to_ascii_lowercase().as_str() {
        "black" => Some(Color::BLACK),
        "white" => Some(Color::WHITE),
        "red" => Some(Color::RED),
        "green" => Some(Color::from_rgba8(0, 128, 0, 255)),
        "blue" => Some(Color::from_rgba8(0, 0, 255, 255)),
        "yellow" => Some(Color::from_rgba8(255, 255, 0, 255)),
        "gray" | "grey" => Some(Color::from_rgba8(128, 128, 128, 255)),
        "transparent" => Some(Color::TRANSPARENT),
        _ => None,
    }
}

impl From<[f32; 4]> for Color {
    fn from(c: [f32; 4]) -> Self {
        Self::from_array(c)
    }
}
