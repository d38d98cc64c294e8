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

pub mod path;
pub mod pattern;
pub mod transform;

use path::{Key, Path};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt};
use tracing::debug;

use crate::error::Result;
use crate::rules::{Rule, RuleKind, RuleSet};
use transform::{text_form, type_tag};

/// Error marker a proxying backend puts in place of a non-JSON upstream body.
pub const NON_JSON_SENTINEL: &str = "non-json response from backend";
/// Error message the test backend returns for requests it cannot date.
pub const INVALID_TIMESTAMP_SENTINEL: &str = "Invalid timestamp";

/// How should numbers be compared.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumericMode {
    /// Different numeric types aren't considered equal.
    Strict,
    /// All numeric types are converted to float before comparison.
    #[default]
    AssumeFloat,
}

/// One leaf-level mismatch that survived every suppression and tolerance rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub path: Path,
    pub original: Option<Value>,
    pub test: Option<Value>,
}

/// Difference counters of one comparison pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total_differences: usize,
    pub fields: BTreeMap<String, usize>,
}

impl Statistics {
    fn record(&mut self, path: &Path) {
        self.total_differences += 1;
        *self.fields.entry(path.to_string()).or_insert(0) += 1;
    }
}

/// Result of comparing two normalized documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    pub differences: Vec<Difference>,
    pub statistics: Statistics,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        self.differences.is_empty()
    }

    fn push(&mut self, path: Path, original: Option<&Value>, test: Option<&Value>) {
        self.statistics.record(&path);
        self.differences.push(Difference {
            path,
            original: original.cloned(),
            test: test.cloned(),
        });
    }
}

/// Tolerance-aware structural comparison of two documents.
///
/// Ignore, `typeOnly` and `toStrings` rules are honoured here as well, so
/// raw documents can be compared. Documents that went through
/// [`transform::normalize`] must be flagged with [`Comparator::normalized`]:
/// their `typeOnly` nodes already hold the type name.
#[derive(Debug, Clone, Copy)]
pub struct Comparator<'r> {
    rules: &'r RuleSet,
    endpoint: Option<&'r str>,
    normalized: bool,
}

impl<'r> Comparator<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self {
            rules,
            endpoint: None,
            normalized: false,
        }
    }

    /// Both documents were produced by [`transform::normalize`] with the same rules.
    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    /// Endpoint the documents were obtained from, checked against volatile paths.
    pub fn with_endpoint(mut self, endpoint: &'r str) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn compare(&self, original: &Value, test: &Value) -> Comparison {
        let mut acc = Comparison::default();

        if self.endpoint.is_some_and(|e| self.rules.is_volatile(e)) {
            debug!(endpoint = self.endpoint, "volatile endpoint, skipping comparison");
            return acc;
        }

        diff_with(Some(original), Some(test), *self, Path::Root, &mut acc);
        acc
    }
}

pub(crate) fn diff(original: &Value, test: &Value, rules: &RuleSet) -> Comparison {
    Comparator::new(rules).compare(original, test)
}

/// Normalizes both documents in place and compares them.
pub fn reconcile(original: &mut Value, test: &mut Value, rules: &RuleSet) -> Result<Comparison> {
    transform::normalize(original, rules)?;
    transform::normalize(test, rules)?;
    Ok(Comparator::new(rules).normalized().compare(original, test))
}

fn diff_with(
    original: Option<&Value>,
    test: Option<&Value>,
    comparator: Comparator<'_>,
    path: Path,
    acc: &mut Comparison,
) {
    let mut folder = DiffFolder {
        test,
        path,
        acc,
        comparator,
    };

    fold_json(original, &mut folder);
}

struct DiffFolder<'a, 'b> {
    test: Option<&'a Value>,
    path: Path,
    acc: &'b mut Comparison,
    comparator: Comparator<'a>,
}

impl<'a, 'b> DiffFolder<'a, 'b> {
    fn rules(&self) -> &'a RuleSet {
        self.comparator.rules
    }

    fn is_suppressed(&self, original: Option<&Value>) -> bool {
        let rules = self.rules();

        if self.path != Path::Root && rules.find(RuleKind::Ignore, &self.path).is_some() {
            return true;
        }

        if original
            .and_then(|o| o.get("error"))
            .is_some_and(|e| e == NON_JSON_SENTINEL)
        {
            debug!(path = %self.path, "original carries the non-json backend marker");
            return true;
        }

        if self
            .test
            .and_then(|t| t.get("error"))
            .and_then(|e| e.get("message"))
            .is_some_and(|m| m == INVALID_TIMESTAMP_SENTINEL)
        {
            debug!(path = %self.path, "test carries the invalid timestamp marker");
            return true;
        }

        self.path != Path::Root && rules.is_volatile(&self.path.to_string())
    }

    fn on_object(&mut self, original: &Map<String, Value>, test: &Map<String, Value>) {
        let extra = test.keys().filter(|key| !original.contains_key(*key));
        for key in original.keys().chain(extra) {
            let path = self.path.append(Key::Field(key.clone()));
            diff_with(original.get(key), test.get(key), self.comparator, path, self.acc);
        }
    }

    fn on_array(&mut self, original: &[Value], test: &[Value]) {
        for idx in 0..original.len().max(test.len()) {
            let path = self.path.append(Key::Idx(idx));
            diff_with(original.get(idx), test.get(idx), self.comparator, path, self.acc);
        }
    }

    fn on_type_only(&mut self, original: Option<&Value>) {
        let normalized = self.comparator.normalized;
        if type_name(original, normalized) != type_name(self.test, normalized) {
            self.acc.push(self.path.clone(), original, self.test);
        }
    }

    fn on_leaf(&mut self, original: Option<&Value>) {
        if !self.leaf_matches(original, self.test) {
            self.acc.push(self.path.clone(), original, self.test);
        }
    }

    fn leaf_matches(&self, original: Option<&Value>, test: Option<&Value>) -> bool {
        let rules = self.rules();
        let path = &self.path;

        if rules.find(RuleKind::ToString, path).is_some() {
            return original.map(text_form) == test.map(text_form);
        }

        let numbers = original.and_then(Value::as_f64).zip(test.and_then(Value::as_f64));

        if let (Some(Rule::Allowance(rule)), Some((o, t))) =
            (rules.find(RuleKind::Allowance, path), numbers)
        {
            return (o - t).abs() <= rule.value;
        }

        if let (Some(Rule::AllowancePercent(rule)), Some((o, t))) =
            (rules.find(RuleKind::AllowancePercent, path), numbers)
        {
            return (o - t).abs() <= (rule.percent / 100.0) * o.abs().max(t.abs());
        }

        if path.last_field() == Some("symbol")
            && ((is_empty_string(original) && is_falsy(test))
                || (is_empty_string(test) && is_falsy(original)))
        {
            return true;
        }

        match (original, test) {
            (Some(o), Some(t)) => values_equal(o, t, rules.numeric_mode),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Type a `typeOnly` node stands for; normalized nodes already hold its name.
fn type_name(value: Option<&Value>, normalized: bool) -> Option<&str> {
    match value {
        Some(Value::String(name)) if normalized => Some(name),
        value => value.map(type_tag),
    }
}

fn is_empty_string(value: Option<&Value>) -> bool {
    value.and_then(Value::as_str) == Some("")
}

fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    }
}

fn values_equal(original: &Value, test: &Value, mode: NumericMode) -> bool {
    match (original, test, mode) {
        (Value::Number(o), Value::Number(t), NumericMode::AssumeFloat) => o.as_f64() == t.as_f64(),
        (Value::Array(o), Value::Array(t), _) => {
            o.len() == t.len() && o.iter().zip(t).all(|(o, t)| values_equal(o, t, mode))
        }
        (Value::Object(o), Value::Object(t), _) => {
            o.len() == t.len()
                && o
                    .iter()
                    .all(|(k, v)| t.get(k).is_some_and(|t| values_equal(v, t, mode)))
        }
        _ => original == test,
    }
}

/// Pretty prints `value` with every line shifted right by `level` spaces.
fn write_indented(f: &mut fmt::Formatter, value: &Value, level: usize) -> fmt::Result {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        write!(f, "{:level$}{}", "", line)?;
        if lines.peek().is_some() {
            writeln!(f)?;
        }
    }
    Ok(())
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.original, &self.test) {
            (Some(original), Some(test)) => {
                writeln!(f, "json atoms at path \"{}\" are not equal:", self.path)?;
                writeln!(f, "    original:")?;
                write_indented(f, original, 8)?;
                writeln!(f, "\n    test:")?;
                write_indented(f, test, 8)?;
            }
            (None, Some(_)) => {
                write!(f, "json atom at path \"{}\" is missing from original", self.path)?;
            }
            (Some(_), None) => {
                write!(f, "json atom at path \"{}\" is missing from test", self.path)?;
            }
            (None, None) => unreachable!("can't both be missing"),
        }

        Ok(())
    }
}

fn fold_json(original: Option<&Value>, folder: &mut DiffFolder<'_, '_>) {
    if folder.is_suppressed(original) {
        return;
    }

    if folder.path != Path::Root && folder.rules().find(RuleKind::TypeOnly, &folder.path).is_some()
    {
        folder.on_type_only(original);
        return;
    }

    match (original, folder.test) {
        (Some(Value::Object(o)), Some(Value::Object(t))) => folder.on_object(o, t),
        (Some(Value::Array(o)), Some(Value::Array(t))) => folder.on_array(o, t),
        _ => folder.on_leaf(original),
    }
}
