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

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`ReconcileError`].
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Failures that stop a normalization or reconciliation pass.
///
/// Differences between two documents are never reported through this type,
/// they are data and live in [`crate::Comparison`].
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The rule set is not valid JSON or contains an unusable rule.
    #[error("invalid configuration {path}: {reason}")]
    ConfigInvalid { path: String, reason: String },

    /// The rule set file could not be read.
    #[error("cannot read configuration {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A wildcard pattern could not be compiled.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Path enumeration went deeper than the allowed nesting.
    #[error("maximum recursion depth of {limit} exceeded at {path}")]
    RecursionLimitExceeded { path: String, limit: usize },

    /// A rule was applied to a node of a type it cannot handle.
    #[error("cannot apply {rule} at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        rule: &'static str,
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// No test-side record carries the correlation id of an original record.
    #[error("No matching test entry found for UUID {correlation_id}")]
    MissingCorrelation { correlation_id: String },

    /// A captured record line matched the grammar but its body is unusable.
    #[error("invalid record at {}:{line}: {reason}", file.display())]
    RecordInvalid {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    /// A captured record file could not be read.
    #[error("cannot read records {}: {source}", path.display())]
    RecordsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required input was not configured on the builder.
    #[error("no {0} configured")]
    MissingSource(&'static str),

    /// The document could not be fetched at all.
    #[error("error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
