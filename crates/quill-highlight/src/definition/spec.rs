use std::collections::BTreeMap;

use serde::Deserialize;

use crate::color::HighlightingColor;
use crate::error::DefinitionError;

/// A color as written in a definition file. Same shape as the runtime color.
pub type ColorSpec = HighlightingColor;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
/// Raw YAML highlighting definition.
///
/// ```yaml
/// name: Ini
/// extensions: [ini]
/// colors:
///   Section: { foreground: "#000080", font_weight: bold }
///   Comment: { foreground: "#008000" }
/// main:
///   spans:
///     - begin: ";"
///       color: Comment
///   rules:
///     - match: '^\[.*\]'
///       color: Section
/// ```
pub struct DefinitionSpec {
    /// Definition name; other definitions refer to it as `Name/RuleSet`.
    pub name: String,

    #[serde(default)]
    /// File extensions the definition applies to.
    pub extensions: Vec<String>,

    #[serde(default)]
    /// Free-form properties.
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    /// Named colors.
    pub colors: BTreeMap<String, ColorSpec>,

    #[serde(default)]
    /// Rule set active outside any span.
    pub main: RuleSetSpec,

    #[serde(default)]
    /// Named rule sets, referenced from spans and imports.
    pub rule_sets: BTreeMap<String, RuleSetSpec>,
}

impl DefinitionSpec {
    /// Parses a YAML definition.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Raw rule set.
///
/// Candidates are tried in this order: imported entries, `spans`, `keywords`,
/// then `rules`.
pub struct RuleSetSpec {
    /// Match patterns case-insensitively.
    pub ignore_case: bool,
    /// Rule sets whose spans and rules are spliced in front of this one's.
    pub imports: Vec<String>,
    /// Spans.
    pub spans: Vec<SpanSpec>,
    /// Keyword lists.
    pub keywords: Vec<KeywordsSpec>,
    /// Flat rules.
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
/// Reference to the rule set used inside a span.
pub enum RuleSetReference {
    /// `Name`, `Definition/Name`, or `Definition/` for another definition's main rule set.
    Named(String),
    /// A rule set written in place.
    Inline(Box<RuleSetSpec>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
/// Raw span.
pub struct SpanSpec {
    /// Start pattern.
    pub begin: String,

    #[serde(default)]
    /// End pattern; omitted means the span ends at the line end.
    pub end: Option<String>,

    #[serde(default)]
    /// Color of the whole span.
    pub color: Option<String>,

    #[serde(default)]
    /// Color of the start delimiter.
    pub begin_color: Option<String>,

    #[serde(default)]
    /// Color of the end delimiter.
    pub end_color: Option<String>,

    #[serde(default)]
    /// Rule set used inside the span; omitted means plain text.
    pub rule_set: Option<RuleSetReference>,

    #[serde(default = "default_true")]
    /// Whether `color` covers the start delimiter.
    pub span_color_includes_start: bool,

    #[serde(default = "default_true")]
    /// Whether `color` covers the end delimiter.
    pub span_color_includes_end: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
/// Raw flat rule.
pub struct RuleSpec {
    #[serde(rename = "match")]
    /// Pattern.
    pub pattern: String,

    #[serde(default)]
    /// Color reference.
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
/// Raw keyword list.
pub struct KeywordsSpec {
    #[serde(default)]
    /// Color reference.
    pub color: Option<String>,

    /// Whole words to match.
    pub words: Vec<String>,
}

fn default_true() -> bool {
    true
}
