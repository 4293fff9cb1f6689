//! Colors, brushes, and text styles.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::DefinitionError;

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel (255 = opaque).
    pub a: u8,
}

impl Rgba {
    /// Creates an opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Creates a color with explicit alpha.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// CSS color value (`#rrggbb`, or `rgba(...)` when translucent).
    pub fn to_css(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            let alpha = f32::from(self.a) / 255.0;
            format!("rgba({}, {}, {}, {alpha:.3})", self.r, self.g, self.b)
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl FromStr for Rgba {
    type Err = DefinitionError;

    /// Parses `#rrggbb` or `#rrggbbaa`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| DefinitionError::InvalidColor {
            value: value.to_string(),
            message: message.to_string(),
        };
        let hex = value
            .strip_prefix('#')
            .ok_or_else(|| invalid("expected a leading '#'"))?;
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(invalid("expected 6 or 8 hex digits"));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid("invalid hex digit"))
        };
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Rgba::new(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

/// Supplies colors for [`HighlightingBrush::Theme`] references.
pub trait BrushContext {
    /// Looks up a theme color by name.
    fn theme_color(&self, name: &str) -> Option<Rgba>;
}

/// A context without a theme; theme brushes resolve to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTheme;

impl BrushContext for NoTheme {
    fn theme_color(&self, _name: &str) -> Option<Rgba> {
        None
    }
}

impl BrushContext for HashMap<String, Rgba> {
    fn theme_color(&self, name: &str) -> Option<Rgba> {
        self.get(name).copied()
    }
}

/// A foreground or background brush.
///
/// Parsed from `#rrggbb`, `#rrggbbaa`, or `theme:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum HighlightingBrush {
    /// A fixed color.
    Solid(Rgba),
    /// A color looked up in the rendering context's theme.
    Theme(String),
}

impl HighlightingBrush {
    /// Resolves the brush to a concrete color.
    pub fn resolve(&self, context: &dyn BrushContext) -> Option<Rgba> {
        match self {
            HighlightingBrush::Solid(color) => Some(*color),
            HighlightingBrush::Theme(name) => context.theme_color(name),
        }
    }
}

impl FromStr for HighlightingBrush {
    type Err = DefinitionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.strip_prefix("theme:") {
            Some(name) if !name.is_empty() => Ok(HighlightingBrush::Theme(name.to_string())),
            Some(_) => Err(DefinitionError::InvalidColor {
                value: value.to_string(),
                message: "empty theme reference".to_string(),
            }),
            None => value.parse().map(HighlightingBrush::Solid),
        }
    }
}

impl TryFrom<String> for HighlightingBrush {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for HighlightingBrush {
    fn from(color: Rgba) -> Self {
        HighlightingBrush::Solid(color)
    }
}

impl fmt::Display for HighlightingBrush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HighlightingBrush::Solid(color) => fmt::Display::fmt(color, f),
            HighlightingBrush::Theme(name) => write!(f, "theme:{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Font weight.
pub enum FontWeight {
    /// Light weight.
    Light,
    /// Regular weight.
    Normal,
    /// Bold weight.
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Font style.
pub enum FontStyle {
    /// Upright.
    Normal,
    /// Italic.
    Italic,
    /// Oblique.
    Oblique,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// A named text style. Unset properties inherit from whatever is underneath.
pub struct HighlightingColor {
    #[serde(skip)]
    /// Name the color is registered under, if any.
    pub name: Option<String>,

    /// Text color.
    pub foreground: Option<HighlightingBrush>,

    /// Background color.
    pub background: Option<HighlightingBrush>,

    /// Font weight.
    pub font_weight: Option<FontWeight>,

    /// Font style.
    pub font_style: Option<FontStyle>,

    /// Underline decoration.
    pub underline: Option<bool>,

    /// Strikethrough decoration.
    pub strikethrough: Option<bool>,

    /// Font family override.
    pub font_family: Option<String>,

    /// Font size override, in points.
    pub font_size: Option<u32>,
}

impl HighlightingColor {
    /// A color with no properties set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the foreground brush.
    pub fn with_foreground(mut self, brush: impl Into<HighlightingBrush>) -> Self {
        self.foreground = Some(brush.into());
        self
    }

    /// Sets the background brush.
    pub fn with_background(mut self, brush: impl Into<HighlightingBrush>) -> Self {
        self.background = Some(brush.into());
        self
    }

    /// Sets the font weight.
    pub fn with_font_weight(mut self, weight: FontWeight) -> Self {
        self.font_weight = Some(weight);
        self
    }

    /// Sets the font style.
    pub fn with_font_style(mut self, style: FontStyle) -> Self {
        self.font_style = Some(style);
        self
    }

    /// Sets the underline flag.
    pub fn with_underline(mut self, underline: bool) -> Self {
        self.underline = Some(underline);
        self
    }

    /// Overwrites properties of `self` with the properties set in `other`.
    pub fn merge_with(&mut self, other: &HighlightingColor) {
        if other.foreground.is_some() {
            self.foreground.clone_from(&other.foreground);
        }
        if other.background.is_some() {
            self.background.clone_from(&other.background);
        }
        if other.font_weight.is_some() {
            self.font_weight = other.font_weight;
        }
        if other.font_style.is_some() {
            self.font_style = other.font_style;
        }
        if other.underline.is_some() {
            self.underline = other.underline;
        }
        if other.strikethrough.is_some() {
            self.strikethrough = other.strikethrough;
        }
        if other.font_family.is_some() {
            self.font_family.clone_from(&other.font_family);
        }
        if other.font_size.is_some() {
            self.font_size = other.font_size;
        }
    }

    /// Returns `true` if merging this color into another would change nothing.
    pub fn is_empty_for_merge(&self) -> bool {
        self.foreground.is_none()
            && self.background.is_none()
            && self.font_weight.is_none()
            && self.font_style.is_none()
            && self.underline.is_none()
            && self.strikethrough.is_none()
            && self.font_family.is_none()
            && self.font_size.is_none()
    }

    /// CSS declarations for this color, e.g. `color: #ff0000; font-weight: bold;`.
    ///
    /// Theme brushes missing from `context` are left out.
    pub fn to_css(&self, context: &dyn BrushContext) -> String {
        let mut css = String::new();
        if let Some(color) = self.foreground.as_ref().and_then(|b| b.resolve(context)) {
            css.push_str(&format!("color: {}; ", color.to_css()));
        }
        if let Some(color) = self.background.as_ref().and_then(|b| b.resolve(context)) {
            css.push_str(&format!("background-color: {}; ", color.to_css()));
        }
        match self.font_weight {
            Some(FontWeight::Bold) => css.push_str("font-weight: bold; "),
            Some(FontWeight::Normal) => css.push_str("font-weight: normal; "),
            Some(FontWeight::Light) => css.push_str("font-weight: lighter; "),
            None => {}
        }
        match self.font_style {
            Some(FontStyle::Italic) => css.push_str("font-style: italic; "),
            Some(FontStyle::Oblique) => css.push_str("font-style: oblique; "),
            Some(FontStyle::Normal) => css.push_str("font-style: normal; "),
            None => {}
        }
        let decorations: Vec<&str> = [
            (self.underline == Some(true)).then_some("underline"),
            (self.strikethrough == Some(true)).then_some("line-through"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !decorations.is_empty() {
            css.push_str(&format!("text-decoration: {}; ", decorations.join(" ")));
        }
        if let Some(family) = &self.font_family {
            css.push_str(&format!("font-family: {family}; "));
        }
        if let Some(size) = self.font_size {
            css.push_str(&format!("font-size: {size}pt; "));
        }
        css.truncate(css.trim_end().len());
        css
    }
}

impl fmt::Display for HighlightingColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[{name}] {}", self.to_css(&NoTheme)),
            None => f.write_str(&self.to_css(&NoTheme)),
        }
    }
}
