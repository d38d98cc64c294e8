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

use regex::Regex;
use serde::Deserialize;
use std::fmt;

use super::path::{Key, Path};
use crate::error::{ReconcileError, Result};

/// Wildcard pattern over paths.
///
/// Segments are separated by `.` and `[..]` is equivalent to a dotted
/// segment, so `items[*].id` and `items.*.id` are the same pattern. Inside a
/// segment `*` matches any run of characters and `?` exactly one. A segment
/// that is exactly `**` matches zero or more whole segments.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    AnyDepth,
    Exact(String),
    Glob(Regex),
}

impl Segment {
    fn matches(&self, key: &Key) -> bool {
        match self {
            Segment::AnyDepth => true,
            Segment::Exact(text) => key.segment() == text.as_str(),
            Segment::Glob(re) => re.is_match(&key.segment()),
        }
    }
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        let invalid = |reason: &str| ReconcileError::InvalidPattern {
            pattern: source.to_string(),
            reason: reason.to_string(),
        };

        if source.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let mut segments = vec![];
        for raw in split_segments(source).map_err(|reason| invalid(reason))? {
            let segment = if raw == "**" {
                Segment::AnyDepth
            } else if raw.contains(['*', '?']) {
                Segment::Glob(glob_regex(raw).map_err(|err| invalid(&err.to_string()))?)
            } else {
                Segment::Exact(raw.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &Path) -> bool {
        match_from(&self.segments, path.keys())
    }
}

fn match_from(segments: &[Segment], keys: &[Key]) -> bool {
    match segments.split_first() {
        None => keys.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=keys.len()).any(|skip| match_from(rest, &keys[skip..]))
        }
        Some((segment, rest)) => match keys.split_first() {
            Some((key, remaining)) => segment.matches(key) && match_from(rest, remaining),
            None => false,
        },
    }
}

fn split_segments(source: &str) -> std::result::Result<Vec<&str>, &'static str> {
    let mut segments = vec![];
    let mut rest = source;
    while !rest.is_empty() {
        if let Some(inner) = rest.strip_prefix('[') {
            let end = inner.find(']').ok_or("unterminated '['")?;
            segments.push(&inner[..end]);
            rest = &inner[end + 1..];
        } else {
            let field = match rest.strip_prefix('.') {
                Some(field) if !segments.is_empty() => field,
                Some(_) => return Err("pattern starts with '.'"),
                None => rest,
            };
            let end = field.find(['.', '[']).unwrap_or(field.len());
            segments.push(&field[..end]);
            rest = &field[end..];
        }
        if segments.last().is_some_and(|s| s.is_empty()) {
            return Err("empty segment");
        }
    }
    Ok(segments)
}

fn glob_regex(segment: &str) -> std::result::Result<Regex, regex::Error> {
    let mut expr = String::from("^");
    for c in segment.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

impl TryFrom<String> for Pattern {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self> {
        Pattern::new(&value)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Anything carrying a [`Pattern`] it can be selected by.
pub trait PathRule {
    fn pattern(&self) -> &Pattern;
}

impl PathRule for Pattern {
    fn pattern(&self) -> &Pattern {
        self
    }
}

/// First rule, in configuration order, whose pattern matches `path`.
pub fn first_match<'r, R: PathRule>(rules: &'r [R], path: &Path) -> Option<&'r R> {
    rules.iter().find(|rule| rule.pattern().matches(path))
}
