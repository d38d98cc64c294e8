// Copyright 2024 The DocAssert Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::fs;
use std::path::Path as FsPath;

use serde::Deserialize;

use crate::error::{ReconcileError, Result};
use crate::json_diff::path::Path;
use crate::json_diff::pattern::{first_match, PathRule, Pattern};
use crate::json_diff::NumericMode;

/// Endpoints whose responses are keyed by an API key and never stable.
pub const DEFAULT_VOLATILE_PATHS: &[&str] = &["/getTokenHistory?apiKey"];

/// Rule kinds that can be selected by path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    Ignore,
    ToString,
    RoundNumbers,
    TypeOnly,
    SortBy,
    Sort,
    Allowance,
    AllowancePercent,
}

impl RuleKind {
    /// Per-path order used by the transformer unless `ruleOrder` overrides it.
    pub const TRANSFORM_ORDER: [RuleKind; 5] = [
        RuleKind::Ignore,
        RuleKind::ToString,
        RuleKind::RoundNumbers,
        RuleKind::TypeOnly,
        RuleKind::SortBy,
    ];

    fn is_transform(&self) -> bool {
        Self::TRANSFORM_ORDER.contains(self)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::Ignore => "ignore",
            RuleKind::ToString => "toString",
            RuleKind::RoundNumbers => "roundNumbers",
            RuleKind::TypeOnly => "typeOnly",
            RuleKind::SortBy => "sortBy",
            RuleKind::Sort => "sort",
            RuleKind::Allowance => "allowance",
            RuleKind::AllowancePercent => "allowancePercent",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Reorders the array at `path` by the listed sub-keys.
#[derive(Debug, Clone, Deserialize)]
pub struct SortByRule {
    pub path: Pattern,
    #[serde(default)]
    pub keys: Vec<Path>,
    #[serde(default)]
    pub orders: Vec<SortOrder>,
}

impl SortByRule {
    /// Direction for the key at `position`, ascending when unspecified.
    pub fn order(&self, position: usize) -> SortOrder {
        self.orders.get(position).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllowanceRule {
    pub path: Pattern,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllowancePercentRule {
    pub path: Pattern,
    pub percent: f64,
}

impl PathRule for SortByRule {
    fn pattern(&self) -> &Pattern {
        &self.path
    }
}

impl PathRule for AllowanceRule {
    fn pattern(&self) -> &Pattern {
        &self.path
    }
}

impl PathRule for AllowancePercentRule {
    fn pattern(&self) -> &Pattern {
        &self.path
    }
}

/// A rule selected for one path.
#[derive(Debug, Clone, Copy)]
pub enum Rule<'r> {
    Ignore(&'r Pattern),
    ToString(&'r Pattern),
    RoundNumbers(&'r Pattern),
    TypeOnly(&'r Pattern),
    SortBy(&'r SortByRule),
    Sort(&'r Pattern),
    Allowance(&'r AllowanceRule),
    AllowancePercent(&'r AllowancePercentRule),
}

/// Normalization and comparison rules, usually loaded from `config.json`.
///
/// # Examples
///
/// ```
/// use json_reconcile::RuleSet;
///
/// let rules = RuleSet::from_json(r#"{
///     "ignores": ["meta.**", "items[*].updatedAt"],
///     "allowance": [{ "path": "price", "value": 0.01 }],
///     "sortsBy": [{ "path": "items", "keys": ["id"], "orders": ["desc"] }]
/// }"#).unwrap();
/// assert_eq!(rules.ignores.len(), 2);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSet {
    pub ignores: Vec<Pattern>,
    pub to_strings: Vec<Pattern>,
    pub round_numbers: Vec<Pattern>,
    pub type_only: Vec<Pattern>,
    pub sorts_by: Vec<SortByRule>,
    pub sorts: Vec<Pattern>,
    pub allowance: Vec<AllowanceRule>,
    pub allowance_percent: Vec<AllowancePercentRule>,
    pub show_full_response: bool,
    pub beautify_diff: bool,
    pub numeric_mode: NumericMode,
    pub rule_order: Option<Vec<RuleKind>>,
    pub volatile_paths: Vec<String>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            ignores: vec![],
            to_strings: vec![],
            round_numbers: vec![],
            type_only: vec![],
            sorts_by: vec![],
            sorts: vec![],
            allowance: vec![],
            allowance_percent: vec![],
            show_full_response: false,
            beautify_diff: false,
            numeric_mode: NumericMode::AssumeFloat,
            rule_order: None,
            volatile_paths: DEFAULT_VOLATILE_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::parse(json, "<inline>")
    }

    pub fn from_file(path: impl AsRef<FsPath>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ReconcileError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(json: &str, origin: &str) -> Result<Self> {
        let rules: RuleSet =
            serde_json::from_str(json).map_err(|err| ReconcileError::ConfigInvalid {
                path: origin.to_string(),
                reason: err.to_string(),
            })?;

        if let Some(order) = &rules.rule_order {
            if let Some(kind) = order.iter().find(|kind| !kind.is_transform()) {
                return Err(ReconcileError::ConfigInvalid {
                    path: origin.to_string(),
                    reason: format!("{} cannot appear in ruleOrder", kind),
                });
            }
        }

        for sort in &rules.sorts_by {
            if sort.orders.len() > sort.keys.len() {
                return Err(ReconcileError::ConfigInvalid {
                    path: origin.to_string(),
                    reason: format!("sortsBy {} has more orders than keys", sort.path),
                });
            }
        }

        Ok(rules)
    }

    /// Per-path transformation order.
    pub fn transform_order(&self) -> &[RuleKind] {
        match &self.rule_order {
            Some(order) => order,
            None => &RuleKind::TRANSFORM_ORDER,
        }
    }

    /// First configured rule of `kind` whose pattern matches `path`.
    pub fn find(&self, kind: RuleKind, path: &Path) -> Option<Rule<'_>> {
        match kind {
            RuleKind::Ignore => first_match(&self.ignores, path).map(Rule::Ignore),
            RuleKind::ToString => first_match(&self.to_strings, path).map(Rule::ToString),
            RuleKind::RoundNumbers => {
                first_match(&self.round_numbers, path).map(Rule::RoundNumbers)
            }
            RuleKind::TypeOnly => first_match(&self.type_only, path).map(Rule::TypeOnly),
            RuleKind::SortBy => first_match(&self.sorts_by, path).map(Rule::SortBy),
            RuleKind::Sort => first_match(&self.sorts, path).map(Rule::Sort),
            RuleKind::Allowance => first_match(&self.allowance, path).map(Rule::Allowance),
            RuleKind::AllowancePercent => {
                first_match(&self.allowance_percent, path).map(Rule::AllowancePercent)
            }
        }
    }

    /// True when `location` (a path or an endpoint) contains a volatile marker.
    pub fn is_volatile(&self, location: &str) -> bool {
        self.volatile_paths
            .iter()
            .any(|marker| location.contains(marker.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let rules = RuleSet::from_json(
            r#"{
                "ignores": ["id", "meta.**"],
                "toStrings": ["amount"],
                "roundNumbers": ["score"],
                "typeOnly": ["createdAt"],
                "sortsBy": [{ "path": "items", "keys": ["name", "age"], "orders": ["asc", "desc"] }],
                "sorts": ["tags"],
                "allowance": [{ "path": "value", "value": 0.01 }],
                "allowancePercent": [{ "path": "volume", "percent": 5 }],
                "showFullResponse": true,
                "beautifyDiff": true,
                "somethingElse": 1
            }"#,
        )
        .unwrap();

        assert_eq!(rules.ignores.len(), 2);
        assert_eq!(rules.to_strings[0].as_str(), "amount");
        assert_eq!(rules.sorts_by[0].keys.len(), 2);
        assert_eq!(rules.sorts_by[0].order(1), SortOrder::Desc);
        assert_eq!(rules.allowance[0].value, 0.01);
        assert_eq!(rules.allowance_percent[0].percent, 5.0);
        assert!(rules.show_full_response);
        assert!(rules.beautify_diff);
        assert_eq!(rules.numeric_mode, NumericMode::AssumeFloat);
        assert_eq!(rules.transform_order(), &RuleKind::TRANSFORM_ORDER);
        assert!(rules.is_volatile("/v1/getTokenHistory?apiKey=abc"));
    }

    #[test]
    fn test_empty_config_has_no_rules() {
        let rules = RuleSet::from_json("{}").unwrap();
        assert!(rules.ignores.is_empty());
        assert!(rules.sorts_by.is_empty());
        assert!(!rules.show_full_response);
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            RuleSet::from_json("{ not json"),
            Err(ReconcileError::ConfigInvalid { .. })
        ));
        assert!(matches!(
            RuleSet::from_json(r#"{ "ignores": ["a..b"] }"#),
            Err(ReconcileError::ConfigInvalid { .. })
        ));
        assert!(matches!(
            RuleSet::from_json(r#"{ "ruleOrder": ["allowance"] }"#),
            Err(ReconcileError::ConfigInvalid { .. })
        ));
        assert!(matches!(
            RuleSet::from_json(r#"{ "sortsBy": [{ "path": "a", "keys": [], "orders": ["asc"] }] }"#),
            Err(ReconcileError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            RuleSet::from_file("does/not/exist.json"),
            Err(ReconcileError::ConfigRead { .. })
        ));
    }

    #[test]
    fn test_find_first_rule_of_kind() {
        let rules = RuleSet::from_json(
            r#"{
                "toStrings": ["a.*", "a.b"],
                "allowance": [{ "path": "a.b", "value": 1 }, { "path": "a.*", "value": 2 }]
            }"#,
        )
        .unwrap();
        let path = Path::parse("a.b").unwrap();

        match rules.find(RuleKind::ToString, &path) {
            Some(Rule::ToString(pattern)) => assert_eq!(pattern.as_str(), "a.*"),
            other => panic!("unexpected {:?}", other),
        }
        match rules.find(RuleKind::Allowance, &path) {
            Some(Rule::Allowance(rule)) => assert_eq!(rule.value, 1.0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rules.find(RuleKind::Ignore, &path).is_none());
    }

    #[test]
    fn test_custom_rule_order() {
        let rules = RuleSet::from_json(r#"{ "ruleOrder": ["typeOnly", "ignore"] }"#).unwrap();
        assert_eq!(
            rules.transform_order(),
            &[RuleKind::TypeOnly, RuleKind::Ignore]
        );
    }
}
