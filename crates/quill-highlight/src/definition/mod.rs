//! Highlighting definitions.
//!
//! A [`HighlightingDefinition`] is an arena of rule sets and spans addressed by
//! [`RuleSetId`] / [`SpanId`]. Spans refer to their interior rule set by id, so
//! recursive structures (a span whose interior contains itself) need no shared
//! ownership. Ids are only meaningful for the definition that issued them.
//!
//! Definitions are assembled with a [`DefinitionBuilder`], or described as data
//! ([`DefinitionSpec`], usually YAML) and compiled with [`compile_definition`].

mod builder;
mod compiler;
mod spec;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use regex::Regex;

use crate::color::HighlightingColor;
use crate::engine::SpanStack;

pub(crate) use builder::normalize_extension;
pub use builder::{DefinitionBuilder, SpanBuilder};
pub use compiler::{DefinitionResolver, NoDefinitions, compile_definition};
pub use spec::{ColorSpec, DefinitionSpec, KeywordsSpec, RuleSetReference, RuleSetSpec, RuleSpec, SpanSpec};

/// Index of a rule set within its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleSetId(u32);

/// Index of a span within its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u32);

impl RuleSetId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl SpanId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
/// A flat token rule: text matching `regex` gets `color`.
pub struct HighlightingRule {
    /// Compiled pattern.
    pub(crate) regex: Regex,
    /// Color for matched text; `None` consumes the text without coloring it.
    pub(crate) color: Option<Arc<HighlightingColor>>,
}

impl HighlightingRule {
    /// The source pattern.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// The color applied to matches.
    pub fn color(&self) -> Option<&Arc<HighlightingColor>> {
        self.color.as_ref()
    }
}

#[derive(Debug, Clone)]
/// A region opened by `start` and closed by `end`, highlighted with its own rule set.
pub struct HighlightingSpan {
    pub(crate) start: Regex,
    pub(crate) end: Regex,
    pub(crate) rule_set: Option<RuleSetId>,
    pub(crate) span_color: Option<Arc<HighlightingColor>>,
    pub(crate) start_color: Option<Arc<HighlightingColor>>,
    pub(crate) end_color: Option<Arc<HighlightingColor>>,
    pub(crate) span_color_includes_start: bool,
    pub(crate) span_color_includes_end: bool,
}

impl HighlightingSpan {
    /// Pattern that opens the span.
    pub fn start_pattern(&self) -> &str {
        self.start.as_str()
    }

    /// Pattern that closes the span.
    pub fn end_pattern(&self) -> &str {
        self.end.as_str()
    }

    /// Rule set active inside the span; `None` means plain text.
    pub fn rule_set(&self) -> Option<RuleSetId> {
        self.rule_set
    }

    /// Color of the whole span.
    pub fn span_color(&self) -> Option<&Arc<HighlightingColor>> {
        self.span_color.as_ref()
    }

    /// Color of the start delimiter.
    pub fn start_color(&self) -> Option<&Arc<HighlightingColor>> {
        self.start_color.as_ref()
    }

    /// Color of the end delimiter.
    pub fn end_color(&self) -> Option<&Arc<HighlightingColor>> {
        self.end_color.as_ref()
    }

    /// Whether the span color also covers the start delimiter.
    pub fn span_color_includes_start(&self) -> bool {
        self.span_color_includes_start
    }

    /// Whether the span color also covers the end delimiter.
    pub fn span_color_includes_end(&self) -> bool {
        self.span_color_includes_end
    }
}

#[derive(Debug, Clone, Default)]
/// Spans and rules applicable at one nesting level, in priority order.
pub struct HighlightingRuleSet {
    pub(crate) name: Option<String>,
    pub(crate) spans: Vec<SpanId>,
    pub(crate) rules: Vec<HighlightingRule>,
    pub(crate) ignore_case: bool,
}

impl HighlightingRuleSet {
    /// Name the rule set is registered under, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Spans checked for opening, in priority order.
    pub fn spans(&self) -> &[SpanId] {
        &self.spans
    }

    /// Flat rules, in priority order.
    pub fn rules(&self) -> &[HighlightingRule] {
        &self.rules
    }

    /// Whether patterns in this rule set match case-insensitively.
    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }
}

#[derive(Debug, Clone)]
/// A complete, immutable highlighting definition.
pub struct HighlightingDefinition {
    pub(crate) name: String,
    pub(crate) extensions: Vec<String>,
    pub(crate) main_rule_set: RuleSetId,
    pub(crate) rule_sets: Vec<HighlightingRuleSet>,
    pub(crate) spans: Vec<HighlightingSpan>,
    pub(crate) named_colors: BTreeMap<String, Arc<HighlightingColor>>,
    pub(crate) named_rule_sets: HashMap<String, RuleSetId>,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) empty_rule_set: HighlightingRuleSet,
}

impl HighlightingDefinition {
    /// Definition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File extensions (lowercase, with leading `.`) this definition applies to.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Id of the rule set active outside any span.
    pub fn main_rule_set_id(&self) -> RuleSetId {
        self.main_rule_set
    }

    /// The rule set active outside any span.
    pub fn main_rule_set(&self) -> &HighlightingRuleSet {
        self.rule_set(self.main_rule_set)
    }

    /// Looks up a rule set.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different definition and is out of range.
    pub fn rule_set(&self, id: RuleSetId) -> &HighlightingRuleSet {
        &self.rule_sets[id.index()]
    }

    /// Looks up a span.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different definition and is out of range.
    pub fn span(&self, id: SpanId) -> &HighlightingSpan {
        &self.spans[id.index()]
    }

    /// Number of rule sets, including anonymous ones.
    pub fn rule_set_count(&self) -> usize {
        self.rule_sets.len()
    }

    /// Finds a named rule set.
    pub fn named_rule_set(&self, name: &str) -> Option<RuleSetId> {
        self.named_rule_sets.get(name).copied()
    }

    /// Finds a named color.
    pub fn named_color(&self, name: &str) -> Option<&Arc<HighlightingColor>> {
        self.named_colors.get(name)
    }

    /// All named colors, sorted by name.
    pub fn named_colors(&self) -> impl Iterator<Item = &Arc<HighlightingColor>> {
        self.named_colors.values()
    }

    /// Free-form properties attached to the definition.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Rule set active for the innermost span of `stack` (main rule set when empty).
    pub fn rule_set_for(&self, stack: &SpanStack) -> &HighlightingRuleSet {
        match stack.peek() {
            None => self.main_rule_set(),
            Some(&span) => match self.span(span).rule_set {
                Some(id) => self.rule_set(id),
                None => &self.empty_rule_set,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    #[test]
    fn test_rule_set_for_follows_innermost_span() {
        let mut builder = DefinitionBuilder::new("Test");
        let main = builder.main_rule_set();
        let inner = builder.add_rule_set(Some("Inner"), false);
        let with_rules = builder
            .add_span(main, SpanBuilder::new("\"").end("\"").rule_set(inner))
            .unwrap();
        let plain = builder.add_span(main, SpanBuilder::new("'").end("'")).unwrap();
        builder.add_rule(inner, r"\\.", None).unwrap();
        let definition = builder.build();

        let empty = SpanStack::new();
        assert_eq!(definition.rule_set_for(&empty).spans().len(), 2);
        assert_eq!(definition.rule_set_for(&empty.push(with_rules)).rules().len(), 1);
        assert!(definition.rule_set_for(&empty.push(plain)).spans().is_empty());
        assert_eq!(definition.named_rule_set("Inner"), Some(inner));
    }

    #[test]
    fn test_named_colors_are_registered_with_names() {
        let mut builder = DefinitionBuilder::new("Test");
        builder.add_color("Comment", HighlightingColor::new().with_foreground(Rgba::rgb(0, 128, 0)));
        let definition = builder.build();
        let color = definition.named_color("Comment").unwrap();
        assert_eq!(color.name.as_deref(), Some("Comment"));
        assert_eq!(definition.named_colors().count(), 1);
    }
}
