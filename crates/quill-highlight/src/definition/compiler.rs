use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::color::HighlightingColor;
use crate::definition::builder::DefinitionBuilder;
use crate::definition::spec::{DefinitionSpec, RuleSetReference, RuleSetSpec};
use crate::definition::{HighlightingDefinition, RuleSetId, SpanBuilder};
use crate::error::DefinitionError;

/// Supplies other definitions to `Definition/Name` references.
pub trait DefinitionResolver {
    /// Returns the definition registered as `name`.
    fn resolve_definition(&mut self, name: &str) -> Result<Arc<HighlightingDefinition>, DefinitionError>;
}

/// A resolver that knows no definitions; every external reference fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefinitions;

impl DefinitionResolver for NoDefinitions {
    fn resolve_definition(&mut self, name: &str) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        Err(DefinitionError::UnknownDefinition(name.to_string()))
    }
}

/// Compiles a raw definition into its runtime form.
///
/// External rule sets are deep-copied into the result, so the compiled
/// definition does not depend on `resolver` afterwards.
pub fn compile_definition(
    spec: &DefinitionSpec,
    resolver: &mut dyn DefinitionResolver,
) -> Result<HighlightingDefinition, DefinitionError> {
    let mut compiler = Compiler {
        name: &spec.name,
        builder: DefinitionBuilder::new(spec.name.as_str()),
        resolver,
        pending: Vec::new(),
        external: HashMap::new(),
    };
    compiler.compile(spec)?;
    let definition = compiler.builder.build();
    debug!(
        definition = %definition.name(),
        rule_sets = definition.rule_set_count(),
        "compiled highlighting definition"
    );
    Ok(definition)
}

impl HighlightingDefinition {
    /// Parses and compiles a self-contained YAML definition.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        compile_definition(&DefinitionSpec::from_yaml(yaml)?, &mut NoDefinitions)
    }
}

struct PendingImports<'s> {
    rule_set: RuleSetId,
    label: String,
    imports: &'s [String],
}

struct Compiler<'s, 'r> {
    name: &'s str,
    builder: DefinitionBuilder,
    resolver: &'r mut dyn DefinitionResolver,
    pending: Vec<PendingImports<'s>>,
    external: HashMap<String, Arc<HighlightingDefinition>>,
}

impl<'s> Compiler<'s, '_> {
    fn compile(&mut self, spec: &'s DefinitionSpec) -> Result<(), DefinitionError> {
        for extension in &spec.extensions {
            self.builder.extension(extension);
        }
        for (key, value) in &spec.properties {
            self.builder.property(key.as_str(), value.as_str());
        }
        for (name, color) in &spec.colors {
            self.builder.add_color(name, color.clone());
        }

        // Allocate named rule sets up front so spans can refer to them in any order.
        let mut named = Vec::with_capacity(spec.rule_sets.len());
        for (name, rule_set) in &spec.rule_sets {
            let id = self.builder.add_rule_set(Some(name.as_str()), rule_set.ignore_case);
            named.push((id, name, rule_set));
        }

        let main = self.builder.main_rule_set();
        self.builder.set_ignore_case(main, spec.main.ignore_case);
        self.compile_rule_set(main, &spec.main, "main".to_string())?;
        for (id, name, rule_set) in named {
            self.compile_rule_set(id, rule_set, name.clone())?;
        }

        self.resolve_imports()
    }

    fn compile_rule_set(
        &mut self,
        id: RuleSetId,
        spec: &'s RuleSetSpec,
        label: String,
    ) -> Result<(), DefinitionError> {
        for span in &spec.spans {
            let interior = match &span.rule_set {
                None => None,
                Some(RuleSetReference::Named(reference)) => Some(self.resolve_rule_set(reference)?),
                Some(RuleSetReference::Inline(inline)) => {
                    let inner = self.builder.add_rule_set(None, inline.ignore_case);
                    self.compile_rule_set(inner, inline, format!("{label}/{}", span.begin))?;
                    Some(inner)
                }
            };

            let mut builder = SpanBuilder::new(span.begin.as_str())
                .span_color_includes_start(span.span_color_includes_start)
                .span_color_includes_end(span.span_color_includes_end);
            if let Some(end) = &span.end {
                builder = builder.end(end.as_str());
            }
            if let Some(interior) = interior {
                builder = builder.rule_set(interior);
            }
            if let Some(color) = self.resolve_color(span.color.as_deref())? {
                builder = builder.span_color(color);
            }
            if let Some(color) = self.resolve_color(span.begin_color.as_deref())? {
                builder = builder.start_color(color);
            }
            if let Some(color) = self.resolve_color(span.end_color.as_deref())? {
                builder = builder.end_color(color);
            }
            self.builder.add_span(id, builder)?;
        }

        for keywords in &spec.keywords {
            let color = self.resolve_color(keywords.color.as_deref())?;
            self.builder.add_keywords(id, keywords.words.as_slice(), color)?;
        }
        for rule in &spec.rules {
            let color = self.resolve_color(rule.color.as_deref())?;
            self.builder.add_rule(id, &rule.pattern, color)?;
        }

        if !spec.imports.is_empty() {
            self.pending.push(PendingImports {
                rule_set: id,
                label,
                imports: &spec.imports,
            });
        }
        Ok(())
    }

    fn resolve_imports(&mut self) -> Result<(), DefinitionError> {
        let pending = std::mem::take(&mut self.pending);
        let by_rule_set: HashMap<RuleSetId, usize> = pending
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.rule_set, index))
            .collect();
        let mut finished = HashMap::new();
        for index in 0..pending.len() {
            self.expand_imports(&pending, &by_rule_set, index, &mut finished)?;
        }
        Ok(())
    }

    /// `finished[id]` is `false` while `id` is being expanded and `true` afterwards.
    fn expand_imports(
        &mut self,
        pending: &[PendingImports<'s>],
        by_rule_set: &HashMap<RuleSetId, usize>,
        index: usize,
        finished: &mut HashMap<RuleSetId, bool>,
    ) -> Result<(), DefinitionError> {
        let entry = &pending[index];
        match finished.get(&entry.rule_set) {
            Some(true) => return Ok(()),
            Some(false) => return Err(DefinitionError::CyclicImport(entry.label.clone())),
            None => {}
        }
        finished.insert(entry.rule_set, false);

        let mut spans = Vec::new();
        let mut rules = Vec::new();
        for reference in entry.imports {
            let target = self.resolve_rule_set(reference)?;
            if let Some(&dependency) = by_rule_set.get(&target) {
                self.expand_imports(pending, by_rule_set, dependency, finished)?;
            }
            let (target_spans, target_rules) = self.builder.entries(target);
            spans.extend(target_spans);
            rules.extend(target_rules);
        }
        self.builder.prepend_entries(entry.rule_set, spans, rules);

        finished.insert(entry.rule_set, true);
        Ok(())
    }

    fn resolve_rule_set(&mut self, reference: &str) -> Result<RuleSetId, DefinitionError> {
        let (definition, name) = match reference.split_once('/') {
            Some((definition, name)) if definition != self.name => (Some(definition), name),
            Some((_, name)) => (None, name),
            None => (None, reference),
        };
        let unknown = || DefinitionError::UnknownRuleSet(reference.to_string());

        match definition {
            Some(definition) => {
                let external = self.external_definition(definition)?;
                let id = if name.is_empty() {
                    external.main_rule_set_id()
                } else {
                    external.named_rule_set(name).ok_or_else(unknown)?
                };
                Ok(self.builder.import_rule_set(&external, id))
            }
            None if name.is_empty() => Ok(self.builder.main_rule_set()),
            None => self.builder.named_rule_set(name).ok_or_else(unknown),
        }
    }

    fn resolve_color(
        &mut self,
        reference: Option<&str>,
    ) -> Result<Option<Arc<HighlightingColor>>, DefinitionError> {
        let Some(reference) = reference else {
            return Ok(None);
        };
        let found = match reference.split_once('/') {
            Some((definition, name)) if definition != self.name => {
                self.external_definition(definition)?.named_color(name).cloned()
            }
            Some((_, name)) => self.builder.named_color(name),
            None => self.builder.named_color(reference),
        };
        found
            .map(Some)
            .ok_or_else(|| DefinitionError::UnknownColor(reference.to_string()))
    }

    fn external_definition(&mut self, name: &str) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        if let Some(definition) = self.external.get(name) {
            return Ok(Arc::clone(definition));
        }
        let definition = self.resolver.resolve_definition(name)?;
        self.external.insert(name.to_string(), Arc::clone(&definition));
        Ok(definition)
    }
}
