use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::color::HighlightingColor;
use crate::definition::{
    HighlightingDefinition, HighlightingRule, HighlightingRuleSet, HighlightingSpan, RuleSetId,
    SpanId,
};
use crate::error::DefinitionError;

/// End pattern used by spans that do not name one: the span closes at the line end.
pub(crate) const LINE_END_PATTERN: &str = "$";

#[derive(Debug, Clone)]
/// Describes one span for [`DefinitionBuilder::add_span`].
pub struct SpanBuilder {
    start: String,
    end: Option<String>,
    rule_set: Option<RuleSetId>,
    span_color: Option<Arc<HighlightingColor>>,
    start_color: Option<Arc<HighlightingColor>>,
    end_color: Option<Arc<HighlightingColor>>,
    span_color_includes_start: bool,
    span_color_includes_end: bool,
}

impl SpanBuilder {
    /// A span opened by `start`. Without [`end`](Self::end) it closes at the line end.
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: None,
            rule_set: None,
            span_color: None,
            start_color: None,
            end_color: None,
            span_color_includes_start: true,
            span_color_includes_end: true,
        }
    }

    /// Pattern closing the span.
    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Rule set active inside the span.
    pub fn rule_set(mut self, rule_set: RuleSetId) -> Self {
        self.rule_set = Some(rule_set);
        self
    }

    /// Color of the whole span.
    pub fn span_color(mut self, color: Arc<HighlightingColor>) -> Self {
        self.span_color = Some(color);
        self
    }

    /// Color of the start delimiter.
    pub fn start_color(mut self, color: Arc<HighlightingColor>) -> Self {
        self.start_color = Some(color);
        self
    }

    /// Color of the end delimiter.
    pub fn end_color(mut self, color: Arc<HighlightingColor>) -> Self {
        self.end_color = Some(color);
        self
    }

    /// Whether the span color covers the start delimiter (default `true`).
    pub fn span_color_includes_start(mut self, value: bool) -> Self {
        self.span_color_includes_start = value;
        self
    }

    /// Whether the span color covers the end delimiter (default `true`).
    pub fn span_color_includes_end(mut self, value: bool) -> Self {
        self.span_color_includes_end = value;
        self
    }
}

#[derive(Debug)]
/// Incrementally assembles a [`HighlightingDefinition`].
///
/// Patterns are compiled as they are added, using the case sensitivity of the
/// rule set they are added to.
pub struct DefinitionBuilder {
    name: String,
    extensions: Vec<String>,
    properties: BTreeMap<String, String>,
    named_colors: BTreeMap<String, Arc<HighlightingColor>>,
    named_rule_sets: HashMap<String, RuleSetId>,
    rule_sets: Vec<HighlightingRuleSet>,
    spans: Vec<HighlightingSpan>,
    imported_rule_sets: HashMap<(String, RuleSetId), RuleSetId>,
    imported_spans: HashMap<(String, SpanId), SpanId>,
}

impl DefinitionBuilder {
    /// Starts a definition with an empty main rule set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            properties: BTreeMap::new(),
            named_colors: BTreeMap::new(),
            named_rule_sets: HashMap::new(),
            rule_sets: vec![HighlightingRuleSet::default()],
            spans: Vec::new(),
            imported_rule_sets: HashMap::new(),
            imported_spans: HashMap::new(),
        }
    }

    /// Id of the main rule set.
    pub fn main_rule_set(&self) -> RuleSetId {
        RuleSetId(0)
    }

    /// Adds a file extension. `rs` and `.RS` are both stored as `.rs`.
    pub fn extension(&mut self, extension: &str) -> &mut Self {
        self.extensions.push(normalize_extension(extension));
        self
    }

    /// Sets a free-form property.
    pub fn property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Registers a named color and returns the shared handle rules should use.
    pub fn add_color(&mut self, name: &str, mut color: HighlightingColor) -> Arc<HighlightingColor> {
        color.name = Some(name.to_string());
        let color = Arc::new(color);
        self.named_colors.insert(name.to_string(), Arc::clone(&color));
        color
    }

    /// Looks up a color registered with [`add_color`](Self::add_color).
    pub fn named_color(&self, name: &str) -> Option<Arc<HighlightingColor>> {
        self.named_colors.get(name).cloned()
    }

    /// Looks up a named rule set.
    pub fn named_rule_set(&self, name: &str) -> Option<RuleSetId> {
        self.named_rule_sets.get(name).copied()
    }

    /// Allocates a rule set; named ones can be found through
    /// [`HighlightingDefinition::named_rule_set`].
    pub fn add_rule_set(&mut self, name: Option<&str>, ignore_case: bool) -> RuleSetId {
        let id = self.push_rule_set(name.map(str::to_string), ignore_case);
        if let Some(name) = name {
            self.named_rule_sets.insert(name.to_string(), id);
        }
        id
    }

    /// Changes the case sensitivity of a rule set. Affects patterns added afterwards.
    pub fn set_ignore_case(&mut self, rule_set: RuleSetId, ignore_case: bool) {
        self.rule_sets[rule_set.index()].ignore_case = ignore_case;
    }

    /// Appends a rule to `rule_set`.
    pub fn add_rule(
        &mut self,
        rule_set: RuleSetId,
        pattern: &str,
        color: Option<Arc<HighlightingColor>>,
    ) -> Result<(), DefinitionError> {
        let regex = self.compile(rule_set, pattern)?;
        self.rule_sets[rule_set.index()]
            .rules
            .push(HighlightingRule { regex, color });
        Ok(())
    }

    /// Appends a rule matching any of `words` as a whole word.
    ///
    /// Longer words are tried first so that a keyword never shadows a longer one
    /// sharing its prefix. An empty word list adds nothing.
    pub fn add_keywords<S: AsRef<str>>(
        &mut self,
        rule_set: RuleSetId,
        words: &[S],
        color: Option<Arc<HighlightingColor>>,
    ) -> Result<(), DefinitionError> {
        let mut words: Vec<&str> = words
            .iter()
            .map(AsRef::as_ref)
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Ok(());
        }
        words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        words.dedup();
        let alternation: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
        let pattern = format!(r"\b(?:{})\b", alternation.join("|"));
        self.add_rule(rule_set, &pattern, color)
    }

    /// Appends a span to `rule_set`.
    pub fn add_span(&mut self, rule_set: RuleSetId, span: SpanBuilder) -> Result<SpanId, DefinitionError> {
        let start = self.compile(rule_set, &span.start)?;
        let end = self.compile(rule_set, span.end.as_deref().unwrap_or(LINE_END_PATTERN))?;
        let id = SpanId(self.spans.len() as u32);
        self.spans.push(HighlightingSpan {
            start,
            end,
            rule_set: span.rule_set,
            span_color: span.span_color,
            start_color: span.start_color,
            end_color: span.end_color,
            span_color_includes_start: span.span_color_includes_start,
            span_color_includes_end: span.span_color_includes_end,
        });
        self.rule_sets[rule_set.index()].spans.push(id);
        Ok(id)
    }

    /// Copies a rule set (and everything reachable from it) out of another
    /// definition, returning its local id.
    ///
    /// Importing the same rule set twice returns the same local copy, and
    /// recursive structures in the source stay recursive.
    pub fn import_rule_set(&mut self, from: &HighlightingDefinition, id: RuleSetId) -> RuleSetId {
        let key = (from.name().to_string(), id);
        if let Some(&local) = self.imported_rule_sets.get(&key) {
            return local;
        }
        let source = from.rule_set(id);
        let local = self.push_rule_set(source.name.clone(), source.ignore_case);
        self.imported_rule_sets.insert(key, local);
        for &span in &source.spans {
            let local_span = self.import_span(from, span);
            self.rule_sets[local.index()].spans.push(local_span);
        }
        self.rule_sets[local.index()].rules = source.rules.clone();
        local
    }

    fn import_span(&mut self, from: &HighlightingDefinition, id: SpanId) -> SpanId {
        let key = (from.name().to_string(), id);
        if let Some(&local) = self.imported_spans.get(&key) {
            return local;
        }
        let mut span = from.span(id).clone();
        let interior = span.rule_set.take();
        let local = SpanId(self.spans.len() as u32);
        self.spans.push(span);
        self.imported_spans.insert(key, local);
        if let Some(interior) = interior {
            let local_set = self.import_rule_set(from, interior);
            self.spans[local.index()].rule_set = Some(local_set);
        }
        local
    }

    /// Copies of the spans and rules currently in `rule_set`.
    pub(crate) fn entries(&self, rule_set: RuleSetId) -> (Vec<SpanId>, Vec<HighlightingRule>) {
        let set = &self.rule_sets[rule_set.index()];
        (set.spans.clone(), set.rules.clone())
    }

    /// Inserts spans and rules in front of the existing entries of `rule_set`.
    pub(crate) fn prepend_entries(
        &mut self,
        rule_set: RuleSetId,
        spans: Vec<SpanId>,
        rules: Vec<HighlightingRule>,
    ) {
        let set = &mut self.rule_sets[rule_set.index()];
        set.spans.splice(0..0, spans);
        set.rules.splice(0..0, rules);
    }

    /// Finishes the definition.
    pub fn build(self) -> HighlightingDefinition {
        HighlightingDefinition {
            name: self.name,
            extensions: self.extensions,
            main_rule_set: RuleSetId(0),
            rule_sets: self.rule_sets,
            spans: self.spans,
            named_colors: self.named_colors,
            named_rule_sets: self.named_rule_sets,
            properties: self.properties,
            empty_rule_set: HighlightingRuleSet::default(),
        }
    }

    fn push_rule_set(&mut self, name: Option<String>, ignore_case: bool) -> RuleSetId {
        let id = RuleSetId(self.rule_sets.len() as u32);
        self.rule_sets.push(HighlightingRuleSet {
            name,
            ignore_case,
            ..HighlightingRuleSet::default()
        });
        id
    }

    fn compile(&self, rule_set: RuleSetId, pattern: &str) -> Result<Regex, DefinitionError> {
        RegexBuilder::new(pattern)
            .case_insensitive(self.rule_sets[rule_set.index()].ignore_case)
            .multi_line(true)
            .build()
            .map_err(|e| DefinitionError::Regex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }
}

pub(crate) fn normalize_extension(extension: &str) -> String {
    let lower = extension.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}
