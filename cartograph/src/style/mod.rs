//! Style model: feature type styles, rules, symbolizers and their properties.
//!
//! A [`FeatureTypeStyle`] is an ordered list of [`Rule`]s. A rule selects features with a filter
//! expression and a scale range and draws them with its [`Symbolizer`]s. Symbolizer parameters are
//! [`Properties`]: constant values or expressions evaluated for every feature.

use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::expression::Expr;
use crate::feature::{Feature, Variables};

mod comp_op;
mod enums;
mod key;
mod property;
mod symbolizer;

pub use comp_op::CompOp;
pub use enums::{
    DebugMode, GammaMethod, HaloRasterizer, HorizontalAlignment, LabelPlacement, LineCap,
    LineJoin, PatternAlignment, Scaling, SimplifyAlgorithm, TextTransform, Upright,
    VerticalAlignment,
};
pub use key::{Key, KeyKind};
pub use property::{Properties, Property, PropertyResolver, TransformList, TransformOp};
pub use symbolizer::{
    BuildingSymbolizer, DebugSymbolizer, Direction, GlyphSymbolizer, GroupRule, GroupSymbolizer,
    LinePatternSymbolizer, LineSymbolizer, MarkersSymbolizer, PlacementAttempt, PointSymbolizer,
    PolygonPatternSymbolizer, PolygonSymbolizer, RasterSymbolizer, SimplePlacements, Symbolizer,
    SymbolizerKind, TextPlacements, TextSymbolizer,
};

fn default_max_scale() -> f64 {
    f64::MAX
}

fn default_opacity() -> f64 {
    1.0
}

/// Filter + scale range + ordered list of symbolizers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rule {
    /// Name of the rule, used in log messages only.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    /// Filter expression. A rule without a filter matches all features.
    #[cfg_attr(feature = "serde", serde(default))]
    pub filter: Option<Expr>,
    /// Minimum scale denominator (inclusive).
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_scale: f64,
    /// Maximum scale denominator (exclusive).
    #[cfg_attr(feature = "serde", serde(default = "default_max_scale"))]
    pub max_scale: f64,
    /// The rule applies to features no regular rule of the style matched. The filter of such a rule
    /// is not evaluated.
    #[cfg_attr(feature = "serde", serde(default))]
    pub else_filter: bool,
    /// The rule applies to features at least one regular rule of the style matched. The filter of
    /// such a rule is not evaluated.
    #[cfg_attr(feature = "serde", serde(default))]
    pub also_filter: bool,
    /// Symbolizers, applied in order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub symbolizers: Vec<Symbolizer>,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            name: None,
            filter: None,
            min_scale: 0.0,
            max_scale: default_max_scale(),
            else_filter: false,
            also_filter: false,
            symbolizers: vec![],
        }
    }
}

impl Rule {
    /// Creates a rule that matches everything and has no symbolizers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter.
    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the scale denominator range.
    pub fn with_scale_range(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    /// Adds a symbolizer.
    pub fn with_symbolizer(mut self, symbolizer: impl Into<Symbolizer>) -> Self {
        self.symbolizers.push(symbolizer.into());
        self
    }

    /// Makes it an "else" rule.
    pub fn as_else(mut self) -> Self {
        self.else_filter = true;
        self
    }

    /// Makes it an "also" rule.
    pub fn as_also(mut self) -> Self {
        self.also_filter = true;
        self
    }

    /// Returns true if the scale denominator is in the rule range.
    pub fn is_active(&self, scale_denominator: f64) -> bool {
        self.min_scale <= scale_denominator && scale_denominator < self.max_scale
    }

    fn is_regular(&self) -> bool {
        !self.else_filter && !self.also_filter
    }

    /// Evaluates the filter of the rule.
    pub fn matches(&self, feature: &Feature, variables: &Variables) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.matches(feature, variables))
    }

    /// Adds names of attributes the rule reads to the set.
    pub fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        if let Some(filter) = &self.filter {
            filter.collect_attributes(names);
        }
        for symbolizer in &self.symbolizers {
            symbolizer.collect_attributes(names);
        }
    }
}

/// How many regular rules of a style may apply to one feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum FilterMode {
    /// Every matching rule paints the feature.
    #[default]
    All,
    /// Only the first matching rule paints the feature.
    First,
}

/// Named list of rules applied to the features of a layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureTypeStyle {
    /// Rules in declaration order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rules: Vec<Rule>,
    /// Rule matching mode.
    #[cfg_attr(feature = "serde", serde(default))]
    pub filter_mode: FilterMode,
    /// Compositing of the whole style into the map image.
    #[cfg_attr(feature = "serde", serde(default))]
    pub comp_op: Option<CompOp>,
    /// Opacity of the whole style.
    #[cfg_attr(feature = "serde", serde(default = "default_opacity"))]
    pub opacity: f64,
    /// Properties used by all symbolizers of the style that don't set them.
    #[cfg_attr(feature = "serde", serde(default))]
    pub defaults: Properties,
}

impl Default for FeatureTypeStyle {
    fn default() -> Self {
        Self {
            rules: vec![],
            filter_mode: FilterMode::default(),
            comp_op: None,
            opacity: default_opacity(),
            defaults: Properties::default(),
        }
    }
}

impl FeatureTypeStyle {
    /// Creates an empty style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Sets filter mode.
    pub fn with_filter_mode(mut self, filter_mode: FilterMode) -> Self {
        self.filter_mode = filter_mode;
        self
    }

    /// Sets compositing operation.
    pub fn with_comp_op(mut self, comp_op: CompOp) -> Self {
        self.comp_op = Some(comp_op);
        self
    }

    /// Sets opacity.
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    /// Sets a style-wide default of a property.
    pub fn with_default(mut self, key: Key, value: impl Into<Property>) -> Self {
        self.defaults.set(key, value);
        self
    }

    /// Returns true if the style must be rendered into a separate buffer and then composited.
    pub fn needs_offscreen(&self) -> bool {
        self.comp_op.is_some_and(|op| op != CompOp::SrcOver) || self.opacity < 1.0
    }

    /// Rules active at the scale denominator.
    pub fn active_rules(&self, scale_denominator: f64) -> ActiveRules<'_> {
        let rules = self
            .rules
            .iter()
            .filter(|r| r.is_active(scale_denominator))
            .collect();
        ActiveRules {
            rules,
            filter_mode: self.filter_mode,
        }
    }
}

/// Rules of a style active at the current scale.
#[derive(Debug, Clone)]
pub struct ActiveRules<'a> {
    rules: Vec<&'a Rule>,
    filter_mode: FilterMode,
}

impl<'a> ActiveRules<'a> {
    /// Returns true if no rule is active.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Active rules in declaration order.
    pub fn rules(&self) -> &[&'a Rule] {
        &self.rules
    }

    /// Rules that apply to the feature, in the order their symbolizers must be applied.
    ///
    /// Regular rules come first in declaration order (only the first one in
    /// [`FilterMode::First`]). Then, if none of them matched, the "else" rules, otherwise the "also"
    /// rules.
    pub fn matching(&self, feature: &Feature, variables: &Variables) -> Vec<&'a Rule> {
        let mut matched = vec![];
        for rule in self.rules.iter().filter(|r| r.is_regular()) {
            if rule.matches(feature, variables) {
                matched.push(*rule);
                if self.filter_mode == FilterMode::First {
                    break;
                }
            }
        }

        let any_matched = !matched.is_empty();
        matched.extend(self.rules.iter().copied().filter(|r| {
            if any_matched {
                r.also_filter
            } else {
                r.else_filter
            }
        }));

        matched
    }

    /// Names of attributes the active rules read.
    pub fn attributes(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for rule in &self.rules {
            rule.collect_attributes(&mut names);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::feature::Context;

    fn named(name: &str) -> Rule {
        Rule {
            name: Some(name.to_string()),
            ..Rule::default()
        }
    }

    fn feature(kind: &str) -> Feature {
        Feature::new(1, Arc::new(Context::new(["kind"]))).with("kind", kind)
    }

    fn names(rules: Vec<&Rule>) -> Vec<&str> {
        rules.iter().filter_map(|r| r.name.as_deref()).collect()
    }

    fn style() -> FeatureTypeStyle {
        FeatureTypeStyle::new()
            .with_rule(named("park").with_filter(Expr::parse("[kind] = 'park'").unwrap()))
            .with_rule(named("green").with_filter(Expr::parse("[kind] = 'park' or [kind] = 'forest'").unwrap()))
            .with_rule(named("fallback").as_else())
            .with_rule(named("outline").as_also())
            .with_rule(named("small").with_scale_range(0.0, 1000.0))
    }

    #[test]
    fn all_matching_rules_apply() {
        let style = style();
        let active = style.active_rules(5000.0);
        let vars = Variables::new();
        assert_eq!(names(active.matching(&feature("park"), &vars)), ["park", "green", "outline"]);
        assert_eq!(names(active.matching(&feature("forest"), &vars)), ["green", "outline"]);
        assert_eq!(names(active.matching(&feature("road"), &vars)), ["fallback"]);
    }

    #[test]
    fn first_match_mode() {
        let style = style().with_filter_mode(FilterMode::First);
        let active = style.active_rules(5000.0);
        let vars = Variables::new();
        assert_eq!(names(active.matching(&feature("park"), &vars)), ["park", "outline"]);
    }

    #[test]
    fn rule_without_filter_matches_in_scale_range() {
        let style = style();
        let vars = Variables::new();

        let active = style.active_rules(500.0);
        assert_eq!(active.rules().len(), 5);
        assert_eq!(
            names(active.matching(&feature("road"), &vars)),
            ["small", "outline"]
        );

        // Upper bound is exclusive.
        let active = style.active_rules(1000.0);
        assert_eq!(active.rules().len(), 4);
    }

    #[test]
    fn attributes_and_offscreen() {
        let style = style();
        assert_eq!(
            style.active_rules(1.0).attributes().into_iter().collect::<Vec<_>>(),
            ["kind"]
        );
        assert!(!style.needs_offscreen());
        assert!(style.clone().with_opacity(0.5).needs_offscreen());
        assert!(style.clone().with_comp_op(CompOp::Multiply).needs_offscreen());
        assert!(!style.with_comp_op(CompOp::SrcOver).needs_offscreen());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialization() {
        let json = r##"{
            "filter_mode": "first",
            "comp_op": "multiply",
            "defaults": {"stroke": "#333333"},
            "rules": [
                {"filter": "[kind] = 'park'", "max_scale": 50000, "symbolizers": [{"type": "polygon"}]},
                {"else_filter": true, "symbolizers": [{"type": "line", "properties": {"stroke-width": 2}}]}
            ]
        }"##;
        let style: FeatureTypeStyle = serde_json::from_str(json).unwrap();
        assert_eq!(style.filter_mode, FilterMode::First);
        assert_eq!(style.comp_op, Some(CompOp::Multiply));
        assert_eq!(style.opacity, 1.0);
        assert_eq!(style.rules[1].max_scale, f64::MAX);
        assert!(style.rules[1].else_filter);

        let back: FeatureTypeStyle =
            serde_json::from_str(&serde_json::to_string(&style).unwrap()).unwrap();
        assert_eq!(back, style);

        let error = serde_json::from_str::<FeatureTypeStyle>(r#"{"rules": [{"filter": "[a] ="}]}"#)
            .unwrap_err()
            .to_string();
        insta::assert_snapshot!(error.split(" (in").next().unwrap_or_default(), @"failed to parse expression at position 5: unexpected end of expression");
    }
}
