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

#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

use std::fmt::{self, Display};

use tracing::info;

pub use crate::batch::{BatchReconciler, BatchReport, Mismatch};
pub use crate::domain::{CorrelatedPair, HttpMethod, Record};
pub use crate::error::{ReconcileError, Result};
pub use crate::json_diff::path::{enumerate, Key, Path, PathIter, MAX_DEPTH};
pub use crate::json_diff::pattern::Pattern;
pub use crate::json_diff::transform::normalize;
pub use crate::json_diff::{
    reconcile, Comparator, Comparison, Difference, NumericMode, Statistics,
};
pub use crate::retry::{EndpointOutcome, RetryController, Target};
pub use crate::rules::{
    AllowancePercentRule, AllowanceRule, Rule, RuleKind, RuleSet, SortByRule, SortOrder,
};

mod batch;
mod domain;
mod error;
mod fetch;
mod json_diff;
pub mod logging;
pub mod render;
pub mod replay;
mod retry;
mod rules;

/// Builder for a reconciliation run.
///
/// The same builder drives both modes: live comparison of two services with
/// [`Reconciler::compare_urls`] and replay of two captured logs with
/// [`Reconciler::reconcile_files`].
///
/// # Examples
///
/// ```
/// use json_reconcile::{HttpMethod, Reconciler, RuleSet};
///
/// async fn test() {
///     let report = Reconciler::new()
///         .with_original("http://localhost:8080")
///         .with_test("http://localhost:8081")
///         .with_rules(RuleSet::from_json(r#"{ "ignores": ["updatedAt"] }"#).unwrap())
///         .with_retries(2)
///         .compare_urls("/api/pairs", HttpMethod::Get)
///         .await;
/// }
/// ```
pub struct Reconciler<'a> {
    original: Option<&'a str>,
    test: Option<&'a str>,
    rules: RuleSet,
    retries: usize,
    replays: usize,
    allowed_errors_percent: f64,
}

impl<'a> Reconciler<'a> {
    /// Constructs a builder with no rules, no retries and a single replay.
    pub fn new() -> Self {
        Self {
            original: None,
            test: None,
            rules: RuleSet::default(),
            retries: 0,
            replays: 1,
            allowed_errors_percent: 0.0,
        }
    }

    /// Sets the reference side: a base URL or a captured log file.
    pub fn with_original(mut self, original: &'a str) -> Self {
        self.original = Some(original);
        self
    }

    /// Sets the side under test: a base URL or a captured log file.
    pub fn with_test(mut self, test: &'a str) -> Self {
        self.test = Some(test);
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Extra fetch/compare cycles allowed after a mismatch, live mode only.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Number of independent comparison cycles, live mode only.
    pub fn with_replays(mut self, replays: usize) -> Self {
        self.replays = replays;
        self
    }

    /// Share of mismatching records a replay batch may have and still pass.
    pub fn with_allowed_errors_percent(mut self, percent: f64) -> Self {
        self.allowed_errors_percent = percent;
        self
    }

    /// Fetches `endpoint` from both base URLs and compares the responses.
    ///
    /// # Examples
    ///
    /// ```
    /// use json_reconcile::{HttpMethod, Reconciler};
    ///
    /// async fn test() {
    ///     let reconciler = Reconciler::new()
    ///         .with_original("http://localhost:8080")
    ///         .with_test("http://localhost:8081");
    ///     match reconciler.compare_urls("/api/pairs", HttpMethod::Get).await {
    ///         Ok(report) if report.passed() => {
    ///             // responses agree
    ///         }
    ///         Ok(report) => println!("{}", report),
    ///         Err(err) => eprintln!("{}", err),
    ///     }
    /// }
    /// ```
    pub async fn compare_urls(&self, endpoint: &str, method: HttpMethod) -> Result<UrlReport> {
        let (original_url, test_url) = self.sources()?;
        info!(original_url, test_url, endpoint, %method, "comparing live endpoints");

        let outcomes = RetryController::new(&self.rules)
            .with_retries(self.retries)
            .with_replays(self.replays)
            .run(Target {
                original_url,
                test_url,
                endpoint,
                method,
            })
            .await?;

        let diffs = outcomes
            .iter()
            .filter(|outcome| !outcome.is_match())
            .map(|outcome| render::render_diff(&outcome.original, &outcome.test, &self.rules))
            .collect();

        Ok(UrlReport {
            header: render::endpoint_header(method, endpoint),
            outcomes,
            diffs,
        })
    }

    /// Parses both captured logs and reconciles their records.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use json_reconcile::Reconciler;
    ///
    /// let report = Reconciler::new()
    ///     .with_original("original.log")
    ///     .with_test("test.log")
    ///     .with_allowed_errors_percent(5.0)
    ///     .reconcile_files()
    ///     .unwrap();
    /// println!("{}", report);
    /// ```
    pub fn reconcile_files(&self) -> Result<BatchReport> {
        let (original_path, test_path) = self.sources()?;
        let originals = replay::parse_file(original_path)?;
        let tests = replay::parse_file(test_path)?;

        BatchReconciler::new(&self.rules)
            .with_allowed_errors_percent(self.allowed_errors_percent)
            .reconcile(&originals, &tests)
    }

    fn sources(&self) -> Result<(&'a str, &'a str)> {
        let original = self.original.ok_or(ReconcileError::MissingSource("original"))?;
        let test = self.test.ok_or(ReconcileError::MissingSource("test"))?;
        Ok((original, test))
    }
}

impl<'a> Default for Reconciler<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Report of a live comparison, one outcome per replay.
#[derive(Debug)]
pub struct UrlReport {
    header: String,
    /// Final attempt of every replay.
    pub outcomes: Vec<EndpointOutcome>,
    diffs: Vec<String>,
}

impl UrlReport {
    /// True when the final attempt of every replay matched.
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(EndpointOutcome::is_match)
    }
}

impl Display for UrlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diff in &self.diffs {
            writeln!(f, "{}", self.header)?;
            write!(f, "{}", diff)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compare_urls_reports_final_differences() {
        let mut original = mockito::Server::new_async().await;
        let mut test = mockito::Server::new_async().await;
        original
            .mock("GET", "/api/stats")
            .with_body(r#"{"volume": 100, "updatedAt": 1}"#)
            .create_async()
            .await;
        test.mock("GET", "/api/stats")
            .with_body(r#"{"volume": 120, "updatedAt": 2}"#)
            .create_async()
            .await;

        let original_url = original.url();
        let test_url = test.url();
        let report = Reconciler::new()
            .with_original(&original_url)
            .with_test(&test_url)
            .with_rules(RuleSet::from_json(r#"{ "ignores": ["updatedAt"] }"#).unwrap())
            .with_retries(1)
            .compare_urls("/api/stats", HttpMethod::Get)
            .await
            .unwrap();

        assert!(!report.passed());
        assert_eq!(report.outcomes[0].attempts, 2);
        let printed = report.to_string();
        assert!(printed.starts_with("GET /api/stats\n"));
        assert!(printed.contains("-  \"volume\": 100"));
        assert!(printed.contains("+  \"volume\": 120"));
    }

    #[tokio::test]
    async fn test_compare_urls_passes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/ok")
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let url = server.url();
        let report = Reconciler::new()
            .with_original(&url)
            .with_test(&url)
            .compare_urls("/api/ok", HttpMethod::Get)
            .await
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.to_string(), "");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let result = Reconciler::new()
            .with_test("http://localhost:1")
            .compare_urls("/", HttpMethod::Get)
            .await;
        assert!(matches!(result, Err(ReconcileError::MissingSource("original"))));
    }

    #[test]
    fn test_reconcile_files() {
        let report = Reconciler::new()
            .with_original("tests/data/original.log")
            .with_test("tests/data/test.log")
            .with_rules(RuleSet::from_file("tests/data/config.json").unwrap())
            .reconcile_files()
            .unwrap();

        assert_eq!(report.errors, 1);
        assert!(!report.passed());
        let printed = report.to_string();
        assert!(printed.starts_with("Original data: 4 entries\nTest data: 3 entries\n"));
        assert!(printed.contains("Error: No matching test entry found for UUID req-4"));
        assert!(printed.contains("[req-2] /api/pairs"));
        assert!(printed
            .ends_with("Error: Number of errors 1 exceeded the allowed percent 0% in 4 entries"));
    }
}
