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

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::{ReconcileError, Result};

/// Deepest path (in keys) that enumeration accepts.
pub const MAX_DEPTH: usize = 100;

/// Address of one node inside a document, rendered as `a.b[2].c`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Path {
    Root,
    Keys(Vec<Key>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Idx(usize),
    Field(String),
}

impl Key {
    /// Textual form used for pattern matching, indexes become their digits.
    pub(crate) fn segment(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Key::Idx(idx) => idx.to_string().into(),
            Key::Field(field) => field.as_str().into(),
        }
    }
}

impl Path {
    pub(crate) fn append(&self, next: Key) -> Path {
        match self {
            Path::Root => Path::Keys(vec![next]),
            Path::Keys(list) => {
                let mut copy = list.clone();
                copy.push(next);
                Path::Keys(copy)
            }
        }
    }

    pub fn keys(&self) -> &[Key] {
        match self {
            Path::Root => &[],
            Path::Keys(keys) => keys,
        }
    }

    pub fn depth(&self) -> usize {
        self.keys().len()
    }

    /// Name of the last key when it is an object field.
    pub fn last_field(&self) -> Option<&str> {
        match self.keys().last() {
            Some(Key::Field(field)) => Some(field),
            _ => None,
        }
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub(crate) fn prefixes(&self, other: &Path) -> bool {
        let (mine, theirs) = (self.keys(), other.keys());
        mine.len() <= theirs.len() && mine.iter().zip(theirs).all(|(a, b)| a == b)
    }

    /// Parses the dotted/bracketed form, e.g. `items[0].price`.
    pub fn parse(input: &str) -> Result<Path> {
        let invalid = |reason: &str| ReconcileError::InvalidPattern {
            pattern: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Ok(Path::Root);
        }

        let mut keys = vec![];
        let mut rest = input;
        while !rest.is_empty() {
            if let Some(inner) = rest.strip_prefix('[') {
                let end = inner.find(']').ok_or_else(|| invalid("unterminated '['"))?;
                let idx = inner[..end]
                    .parse::<usize>()
                    .map_err(|_| invalid("array index must be a number"))?;
                keys.push(Key::Idx(idx));
                rest = &inner[end + 1..];
            } else {
                let rest_field = rest.strip_prefix('.').unwrap_or(rest);
                let end = rest_field.find(['.', '[']).unwrap_or(rest_field.len());
                if end == 0 {
                    return Err(invalid("empty path segment"));
                }
                keys.push(Key::Field(rest_field[..end].to_string()));
                rest = &rest_field[end..];
            }
        }

        Ok(Path::Keys(keys))
    }

    pub fn resolve<'v>(&self, document: &'v Value) -> Option<&'v Value> {
        self.keys()
            .iter()
            .try_fold(document, |current, key| match key {
                Key::Field(field) => current.get(field.as_str()),
                Key::Idx(idx) => current.get(*idx),
            })
    }

    pub fn resolve_mut<'v>(&self, document: &'v mut Value) -> Option<&'v mut Value> {
        self.keys()
            .iter()
            .try_fold(document, |current, key| match key {
                Key::Field(field) => current.get_mut(field.as_str()),
                Key::Idx(idx) => current.get_mut(*idx),
            })
    }

    /// Unsets the node, leaving no placeholder behind.
    pub fn remove(&self, document: &mut Value) -> Option<Value> {
        let (last, parent) = self.keys().split_last()?;
        let parent = Path::Keys(parent.to_vec()).resolve_mut(document)?;
        match (parent, last) {
            (Value::Object(map), Key::Field(field)) => map.remove(field),
            (Value::Array(list), Key::Idx(idx)) if *idx < list.len() => Some(list.remove(*idx)),
            _ => None,
        }
    }
}

impl TryFrom<String> for Path {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self> {
        Path::parse(&value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Idx(idx) => write!(f, "[{}]", idx),
            Key::Field(key) => write!(f, ".{}", key),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Path::Root => write!(f, "(root)"),
            Path::Keys(keys) => {
                for (position, key) in keys.iter().enumerate() {
                    match key {
                        Key::Field(field) if position == 0 => write!(f, "{}", field)?,
                        key => write!(f, "{}", key)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Lazy pre-order walk over every path of a document.
///
/// Object keys come in map order and array elements in index order. The
/// iterator yields a single [`ReconcileError::RecursionLimitExceeded`] and
/// then stops once a path deeper than the limit is reached.
pub struct PathIter<'a> {
    stack: Vec<(Path, &'a Value)>,
    limit: usize,
    failed: bool,
}

impl<'a> PathIter<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self::with_limit(document, MAX_DEPTH)
    }

    pub fn with_limit(document: &'a Value, limit: usize) -> Self {
        let mut iter = Self {
            stack: vec![],
            limit,
            failed: false,
        };
        iter.push_children(&Path::Root, document);
        iter
    }

    fn push_children(&mut self, path: &Path, value: &'a Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter().rev() {
                    self.stack.push((path.append(Key::Field(key.clone())), child));
                }
            }
            Value::Array(list) => {
                for (idx, child) in list.iter().enumerate().rev() {
                    self.stack.push((path.append(Key::Idx(idx)), child));
                }
            }
            _ => {}
        }
    }
}

impl<'a> Iterator for PathIter<'a> {
    type Item = Result<Path>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let (path, value) = self.stack.pop()?;
        if path.depth() > self.limit {
            self.failed = true;
            self.stack.clear();
            return Some(Err(ReconcileError::RecursionLimitExceeded {
                path: path.to_string(),
                limit: self.limit,
            }));
        }

        self.push_children(&path, value);
        Some(Ok(path))
    }
}

/// Collects every path of `document`, failing as a whole on depth overflow.
pub fn enumerate(document: &Value) -> Result<Vec<Path>> {
    PathIter::new(document).collect()
}

/// Paths strictly below `base`, in the order [`enumerate`] yields them.
pub(crate) fn enumerate_below(document: &Value, base: &Path) -> Result<Vec<Path>> {
    let Some(node) = base.resolve(document) else {
        return Ok(vec![]);
    };
    let mut iter = PathIter {
        stack: vec![],
        limit: MAX_DEPTH,
        failed: false,
    };
    iter.push_children(base, node);
    iter.collect()
}
