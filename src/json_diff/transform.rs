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

use std::cmp::Ordering;

use serde_json::{Number, Value};
use tracing::debug;

use super::path::{self, Path};
use crate::error::{ReconcileError, Result};
use crate::rules::{Rule, RuleKind, RuleSet, SortByRule, SortOrder};

/// Field whose empty array is equivalent to the field being absent.
const TOKENS_FIELD: &str = "tokens";

/// What applying one rule kind did to a node.
#[derive(Debug, PartialEq, Eq)]
enum Applied {
    Nothing,
    Changed,
    /// The array was sorted, paths below it now address other elements.
    Reordered,
    Suppressed,
}

/// Applies the rule set to `document` in place.
///
/// Every path is enumerated up front, so a document that is too deep is
/// rejected before a single rule touches it. Paths are visited parent first.
/// Per path, each kind in [`RuleSet::transform_order`] applies its first
/// matching rule. An `ignore` only applies when no earlier kind already
/// rewrote the node, and nothing below a suppressed node is visited. Once an
/// array is sorted the paths below it are enumerated again, so rules on its
/// elements see them in their sorted positions. Suppressed nodes are removed
/// once all paths have been processed so that sibling indexes stay valid
/// meanwhile.
pub fn normalize<'d>(document: &'d mut Value, rules: &RuleSet) -> Result<&'d mut Value> {
    let mut paths = path::enumerate(document)?;
    let mut suppressed: Vec<Path> = vec![];

    let mut next = 0;
    while next < paths.len() {
        let path = paths[next].clone();
        next += 1;

        if suppressed.iter().any(|s| s.prefixes(&path)) {
            continue;
        }

        let mut changed = false;
        let mut reordered = false;
        for kind in rules.transform_order() {
            match apply(*kind, &path, document, rules, changed)? {
                Applied::Nothing => {}
                Applied::Changed => changed = true,
                Applied::Reordered => {
                    changed = true;
                    reordered = true;
                }
                Applied::Suppressed => {
                    suppressed.push(path.clone());
                    break;
                }
            }
        }

        if reordered {
            let end = paths[next..]
                .iter()
                .position(|p| !path.prefixes(p))
                .map_or(paths.len(), |offset| next + offset);
            let below = path::enumerate_below(document, &path)?;
            paths.splice(next..end, below);
        }
    }

    // highest indexes first, so the remaining suppressed paths stay addressable
    suppressed.sort();
    for path in suppressed.iter().rev() {
        path.remove(document);
    }

    drop_empty_tokens(document);
    Ok(document)
}

fn apply(
    kind: RuleKind,
    path: &Path,
    document: &mut Value,
    rules: &RuleSet,
    changed: bool,
) -> Result<Applied> {
    if kind == RuleKind::SortBy {
        return Ok(sort(path, document, rules));
    }

    let Some(rule) = rules.find(kind, path) else {
        return Ok(Applied::Nothing);
    };
    let Some(node) = path.resolve_mut(document) else {
        return Ok(Applied::Nothing);
    };

    match rule {
        Rule::Ignore(_) if changed => {
            debug!(%path, "already rewritten by an earlier rule, not ignored");
            Ok(Applied::Nothing)
        }
        Rule::Ignore(pattern) => {
            debug!(%path, %pattern, "ignoring");
            Ok(Applied::Suppressed)
        }
        Rule::ToString(pattern) => {
            if node.is_object() || node.is_array() {
                return Err(ReconcileError::TypeMismatch {
                    rule: "toString",
                    path: path.to_string(),
                    expected: "a scalar",
                    found: type_tag(node),
                });
            }
            debug!(%path, %pattern, "converting to string");
            *node = Value::String(text_form(node));
            Ok(Applied::Changed)
        }
        Rule::RoundNumbers(pattern) => match node.as_f64() {
            Some(number) => {
                debug!(%path, %pattern, "rounding");
                *node = rounded(number);
                Ok(Applied::Changed)
            }
            None => {
                debug!(%path, found = type_tag(node), "not a number, left as is");
                Ok(Applied::Nothing)
            }
        },
        Rule::TypeOnly(pattern) => {
            debug!(%path, %pattern, "reducing to type");
            *node = Value::String(type_tag(node).to_string());
            Ok(Applied::Changed)
        }
        Rule::SortBy(_) | Rule::Sort(_) | Rule::Allowance(_) | Rule::AllowancePercent(_) => {
            Ok(Applied::Nothing)
        }
    }
}

/// Sorts the array at `path` by its first matching `sortsBy` rule, or by
/// value when only a `sorts` pattern matches.
fn sort(path: &Path, document: &mut Value, rules: &RuleSet) -> Applied {
    let Some(Value::Array(items)) = path.resolve_mut(document) else {
        return Applied::Nothing;
    };

    if let Some(Rule::SortBy(rule)) = rules.find(RuleKind::SortBy, path) {
        debug!(%path, pattern = %rule.path, "sorting by keys");
        items.sort_by(|a, b| compare_by_keys(a, b, rule));
        Applied::Reordered
    } else if rules.find(RuleKind::Sort, path).is_some() {
        debug!(%path, "sorting by value");
        items.sort_by(compare_values);
        Applied::Reordered
    } else {
        Applied::Nothing
    }
}

fn compare_by_keys(a: &Value, b: &Value, rule: &SortByRule) -> Ordering {
    let directed = |ordering: Ordering, position: usize| match rule.order(position) {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    };

    if rule.keys.is_empty() {
        return directed(compare_values(a, b), 0);
    }

    rule.keys
        .iter()
        .enumerate()
        .map(|(position, key)| directed(compare_present(key.resolve(a), key.resolve(b)), position))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn compare_present(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over values: null, booleans, numbers, strings, arrays, objects.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(a, b)| compare_values(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        (a, b) => rank(a).cmp(&rank(b)),
    }
}

/// Runtime type name of a value.
pub fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Canonical textual form; integral floats drop their fraction.
pub(crate) fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn rounded(number: f64) -> Value {
    let number = number.round();
    if number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}

fn drop_empty_tokens(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map
                .get(TOKENS_FIELD)
                .and_then(Value::as_array)
                .is_some_and(Vec::is_empty)
            {
                map.remove(TOKENS_FIELD);
            }
            map.values_mut().for_each(drop_empty_tokens);
        }
        Value::Array(list) => list.iter_mut().for_each(drop_empty_tokens),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalized(mut document: Value, config: &str) -> Value {
        let rules = RuleSet::from_json(config).unwrap();
        normalize(&mut document, &rules).unwrap();
        document
    }

    #[test]
    fn test_no_rules_keeps_document() {
        let doc = json!({ "a": [1, { "b": "c" }], "d": null });
        assert_eq!(normalized(doc.clone(), "{}"), doc);
    }

    #[test]
    fn test_ignore_removes_node_and_descendants() {
        let doc = json!({ "a": { "b": { "c": 1 }, "d": 2 }, "e": 3 });
        assert_eq!(
            normalized(doc, r#"{ "ignores": ["a.b", "a.b.c"] }"#),
            json!({ "a": { "d": 2 }, "e": 3 })
        );
    }

    #[test]
    fn test_ignore_array_elements_keeps_indexes_valid() {
        let doc = json!({ "a": [{ "id": 1 }, { "id": 2 }, { "id": 3 }] });
        assert_eq!(
            normalized(doc, r#"{ "ignores": ["a[0]", "a[2]"] }"#),
            json!({ "a": [{ "id": 2 }] })
        );

        let doc = json!({ "a": [{ "id": 1, "x": 1 }, { "id": 2, "x": 2 }] });
        assert_eq!(
            normalized(doc, r#"{ "ignores": ["a.*.id"] }"#),
            json!({ "a": [{ "x": 1 }, { "x": 2 }] })
        );
    }

    #[test]
    fn test_to_string() {
        let doc = json!({ "a": 12, "b": 1.0, "c": 1.5, "d": true, "e": null, "f": "s" });
        assert_eq!(
            normalized(doc, r#"{ "toStrings": ["*"] }"#),
            json!({ "a": "12", "b": "1", "c": "1.5", "d": "true", "e": "null", "f": "s" })
        );
    }

    #[test]
    fn test_to_string_rejects_containers() {
        let rules = RuleSet::from_json(r#"{ "toStrings": ["a"] }"#).unwrap();
        let mut doc = json!({ "a": { "b": 1 } });
        assert!(matches!(
            normalize(&mut doc, &rules),
            Err(ReconcileError::TypeMismatch { rule: "toString", found: "object", .. })
        ));
    }

    #[test]
    fn test_round_numbers_half_away_from_zero() {
        let doc = json!({ "a": 2.5, "b": -2.5, "c": 2.4, "d": "x", "e": 7 });
        assert_eq!(
            normalized(doc, r#"{ "roundNumbers": ["*"] }"#),
            json!({ "a": 3, "b": -3, "c": 2, "d": "x", "e": 7 })
        );
    }

    #[test]
    fn test_type_only() {
        let doc = json!({ "a": 1, "b": "x", "c": {}, "d": [], "e": false, "f": null });
        assert_eq!(
            normalized(doc, r#"{ "typeOnly": ["*"] }"#),
            json!({
                "a": "number", "b": "string", "c": "object",
                "d": "array", "e": "boolean", "f": "null"
            })
        );
    }

    #[test]
    fn test_sorts_by_keys_and_orders() {
        let doc = json!({ "items": [
            { "name": "b", "age": 1 },
            { "name": "a", "age": 1 },
            { "name": "a", "age": 3 },
            { "age": 9 }
        ] });
        let config = r#"{ "sortsBy": [{ "path": "items", "keys": ["name", "age"], "orders": ["asc", "desc"] }] }"#;
        assert_eq!(
            normalized(doc, config),
            json!({ "items": [
                { "age": 9 },
                { "name": "a", "age": 3 },
                { "name": "a", "age": 1 },
                { "name": "b", "age": 1 }
            ] })
        );
    }

    #[test]
    fn test_sorts_by_nested_key_with_wildcard_path() {
        let doc = json!({ "groups": [
            { "rows": [{ "m": { "v": 2 } }, { "m": { "v": 1 } }] },
            { "rows": [{ "m": { "v": 5 } }, { "m": { "v": 4 } }] }
        ] });
        let config = r#"{ "sortsBy": [{ "path": "groups.*.rows", "keys": ["m.v"] }] }"#;
        assert_eq!(
            normalized(doc, config),
            json!({ "groups": [
                { "rows": [{ "m": { "v": 1 } }, { "m": { "v": 2 } }] },
                { "rows": [{ "m": { "v": 4 } }, { "m": { "v": 5 } }] }
            ] })
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let doc = json!({ "items": [{ "a": 1, "b": 2 }, { "a": 2, "b": 1 }] });
        let config = r#"{ "sortsBy": [
            { "path": "items", "keys": ["b"] },
            { "path": "*", "keys": ["a"] }
        ] }"#;
        assert_eq!(
            normalized(doc, config),
            json!({ "items": [{ "a": 2, "b": 1 }, { "a": 1, "b": 2 }] })
        );
    }

    #[test]
    fn test_sorts_by_value() {
        let doc = json!({ "tags": ["b", "a", "c"], "nums": [10, 9, 1.5], "other": ["z", "y"] });
        assert_eq!(
            normalized(doc, r#"{ "sorts": ["tags", "nums"] }"#),
            json!({ "tags": ["a", "b", "c"], "nums": [1.5, 9, 10], "other": ["z", "y"] })
        );
    }

    #[test]
    fn test_sort_leaves_non_arrays() {
        let doc = json!({ "tags": { "b": 1 } });
        assert_eq!(normalized(doc.clone(), r#"{ "sorts": ["tags"] }"#), doc);
    }

    #[test]
    fn test_empty_tokens_are_dropped() {
        let doc = json!({ "tokens": [], "nested": { "tokens": [] }, "kept": { "tokens": [1] } });
        assert_eq!(
            normalized(doc, "{}"),
            json!({ "nested": {}, "kept": { "tokens": [1] } })
        );
    }

    #[test]
    fn test_ignore_wins_over_type_only_by_default() {
        let doc = json!({ "a": 1, "b": 2 });
        assert_eq!(
            normalized(doc.clone(), r#"{ "ignores": ["a"], "typeOnly": ["a"] }"#),
            json!({ "b": 2 })
        );
        assert_eq!(
            normalized(
                doc,
                r#"{ "ignores": ["a"], "typeOnly": ["a"], "ruleOrder": ["typeOnly", "ignore"] }"#
            ),
            json!({ "a": "number", "b": 2 })
        );
    }

    #[test]
    fn test_too_deep_document_is_left_untouched() {
        let rules = RuleSet::from_json(r#"{ "ignores": ["n"] }"#).unwrap();
        let mut doc = (0..path::MAX_DEPTH + 1).fold(json!(1), |inner, _| json!({ "n": inner }));
        let before = doc.clone();

        assert!(matches!(
            normalize(&mut doc, &rules),
            Err(ReconcileError::RecursionLimitExceeded { .. })
        ));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_compare_values_order() {
        let mut values = vec![json!("a"), json!(2), json!(null), json!([1]), json!(true), json!(1)];
        values.sort_by(compare_values);
        assert_eq!(
            values,
            vec![json!(null), json!(true), json!(1), json!(2), json!("a"), json!([1])]
        );
    }

    #[test]
    fn test_rules_apply_to_sorted_elements() {
        let config = r#"{
            "sortsBy": [{ "path": "items", "keys": ["k"] }],
            "roundNumbers": ["**.x"]
        }"#;
        assert_eq!(
            normalized(json!({ "items": [{ "k": 2, "x": 1.4 }, { "k": 1 }] }), config),
            json!({ "items": [{ "k": 1 }, { "k": 2, "x": 1 }] })
        );
        assert_eq!(
            normalized(json!({ "items": [{ "k": 1 }, { "k": 2, "x": 1.0 }] }), config),
            json!({ "items": [{ "k": 1 }, { "k": 2, "x": 1 }] })
        );
    }

    #[test]
    fn test_ignore_addresses_sorted_positions() {
        let config = r#"{
            "sortsBy": [{ "path": "items", "keys": ["k"] }],
            "ignores": ["items[0].ts"]
        }"#;
        assert_eq!(
            normalized(json!({ "items": [{ "k": 2, "ts": 5 }, { "k": 1, "ts": 7 }] }), config),
            json!({ "items": [{ "k": 1 }, { "k": 2, "ts": 5 }] })
        );
    }

    #[test]
    fn test_sorts_by_value_then_transforms_nested() {
        let config = r#"{ "sorts": ["rows"], "typeOnly": ["rows[0].w"] }"#;
        assert_eq!(
            normalized(json!({ "rows": [{ "v": "b" }, { "v": "a", "w": 1 }] }), config),
            json!({ "rows": [{ "v": "a", "w": "number" }, { "v": "b" }] })
        );
    }

    #[test]
    fn test_reconcile_mixed_shape_sorted_elements() {
        let rules = RuleSet::from_json(
            r#"{ "sortsBy": [{ "path": "items", "keys": ["k"] }], "roundNumbers": ["**.x"] }"#,
        )
        .unwrap();
        let mut original = json!({ "items": [{ "k": 2, "x": 1.4 }, { "k": 1 }] });
        let mut test = json!({ "items": [{ "k": 1 }, { "k": 2, "x": 1.0 }] });
        assert!(crate::json_diff::reconcile(&mut original, &mut test, &rules)
            .unwrap()
            .is_match());
    }
}
