//! Recognized style properties and the geometry programs that consume them

use std::fmt;

use serde::Serialize;
use strata_core::{Color, Value, ValueType};

/// Geometry program a compiled style can emit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramKind {
    /// Polygon interiors
    Fill,
    /// Line strings and polygon outlines, extruded along segment normals
    Stroke,
    /// Point quads shaded as circles
    Symbol,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 3] = [ProgramKind::Fill, ProgramKind::Stroke, ProgramKind::Symbol];

    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::Fill => "fill",
            ProgramKind::Stroke => "stroke",
            ProgramKind::Symbol => "symbol",
        }
    }

    /// Properties whose values the program's vertex stage reads
    pub fn properties(self) -> &'static [StyleProperty] {
        match self {
            ProgramKind::Fill => &[StyleProperty::Filter, StyleProperty::FillColor],
            ProgramKind::Stroke => &[
                StyleProperty::Filter,
                StyleProperty::StrokeColor,
                StyleProperty::StrokeWidth,
            ],
            ProgramKind::Symbol => &[
                StyleProperty::Filter,
                StyleProperty::CircleRadius,
                StyleProperty::CircleFillColor,
                StyleProperty::CircleStrokeColor,
                StyleProperty::CircleStrokeWidth,
                StyleProperty::CircleOpacity,
            ],
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StyleProperty {
    Filter,
    FillColor,
    StrokeColor,
    StrokeWidth,
    CircleRadius,
    CircleFillColor,
    CircleStrokeColor,
    CircleStrokeWidth,
    CircleOpacity,
    ZIndex,
    IconSrc,
    TextField,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 12] = [
        StyleProperty::Filter,
        StyleProperty::FillColor,
        StyleProperty::StrokeColor,
        StyleProperty::StrokeWidth,
        StyleProperty::CircleRadius,
        StyleProperty::CircleFillColor,
        StyleProperty::CircleStrokeColor,
        StyleProperty::CircleStrokeWidth,
        StyleProperty::CircleOpacity,
        StyleProperty::ZIndex,
        StyleProperty::IconSrc,
        StyleProperty::TextField,
    ];

    pub fn from_name(name: &str) -> Option<StyleProperty> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            StyleProperty::Filter => "filter",
            StyleProperty::FillColor => "fill-color",
            StyleProperty::StrokeColor => "stroke-color",
            StyleProperty::StrokeWidth => "stroke-width",
            StyleProperty::CircleRadius => "circle-radius",
            StyleProperty::CircleFillColor => "circle-fill-color",
            StyleProperty::CircleStrokeColor => "circle-stroke-color",
            StyleProperty::CircleStrokeWidth => "circle-stroke-width",
            StyleProperty::CircleOpacity => "circle-opacity",
            StyleProperty::ZIndex => "z-index",
            StyleProperty::IconSrc => "icon-src",
            StyleProperty::TextField => "text-field",
        }
    }

    /// Identifier fragment used in attribute, uniform and local names
    pub fn ident(self) -> &'static str {
        match self {
            StyleProperty::Filter => "filter",
            StyleProperty::FillColor => "fill_color",
            StyleProperty::StrokeColor => "stroke_color",
            StyleProperty::StrokeWidth => "stroke_width",
            StyleProperty::CircleRadius => "circle_radius",
            StyleProperty::CircleFillColor => "circle_fill_color",
            StyleProperty::CircleStrokeColor => "circle_stroke_color",
            StyleProperty::CircleStrokeWidth => "circle_stroke_width",
            StyleProperty::CircleOpacity => "circle_opacity",
            StyleProperty::ZIndex => "z_index",
            StyleProperty::IconSrc => "icon_src",
            StyleProperty::TextField => "text_field",
        }
    }

    pub fn value_type(self) -> ValueType {
        match self {
            StyleProperty::Filter => ValueType::Boolean,
            StyleProperty::FillColor
            | StyleProperty::StrokeColor
            | StyleProperty::CircleFillColor
            | StyleProperty::CircleStrokeColor => ValueType::Color,
            StyleProperty::StrokeWidth
            | StyleProperty::CircleRadius
            | StyleProperty::CircleStrokeWidth
            | StyleProperty::CircleOpacity
            | StyleProperty::ZIndex => ValueType::Number,
            StyleProperty::IconSrc | StyleProperty::TextField => ValueType::String,
        }
    }

    /// Value used when the style leaves the property out
    pub fn default_value(self) -> Value {
        match self {
            StyleProperty::Filter => Value::Boolean(true),
            StyleProperty::FillColor
            | StyleProperty::CircleFillColor
            | StyleProperty::CircleStrokeColor => Value::Color(Color::TRANSPARENT),
            StyleProperty::StrokeColor => Value::Color(Color::BLACK),
            StyleProperty::StrokeWidth | StyleProperty::CircleOpacity => Value::Number(1.0),
            StyleProperty::CircleRadius => Value::Number(5.0),
            StyleProperty::CircleStrokeWidth | StyleProperty::ZIndex => Value::Number(0.0),
            StyleProperty::IconSrc | StyleProperty::TextField => Value::String(String::new()),
        }
    }

    /// Consumed by tessellation on the CPU, never by a shader
    pub fn is_cpu_only(self) -> bool {
        matches!(
            self,
            StyleProperty::ZIndex | StyleProperty::IconSrc | StyleProperty::TextField
        )
    }

    /// Program this property switches on when present in a style
    pub fn program(self) -> Option<ProgramKind> {
        match self {
            StyleProperty::FillColor => Some(ProgramKind::Fill),
            StyleProperty::StrokeColor | StyleProperty::StrokeWidth => Some(ProgramKind::Stroke),
            StyleProperty::CircleRadius
            | StyleProperty::CircleFillColor
            | StyleProperty::CircleStrokeColor
            | StyleProperty::CircleStrokeWidth
            | StyleProperty::CircleOpacity => Some(ProgramKind::Symbol),
            _ => None,
        }
    }
}

impl fmt::Display for StyleProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for property in StyleProperty::ALL {
            assert_eq!(StyleProperty::from_name(property.name()), Some(property));
            assert_eq!(property.default_value().value_type(), property.value_type());
        }
        assert_eq!(StyleProperty::from_name("fill-colour"), None);
    }

    #[test]
    fn every_program_property_switches_on_its_program() {
        for kind in ProgramKind::ALL {
            for property in kind.properties() {
                if *property != StyleProperty::Filter {
                    assert_eq!(property.program(), Some(kind));
                }
            }
        }
    }
}
