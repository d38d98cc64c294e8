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

use std::collections::HashMap;
use std::fmt::{self, Display};

use tracing::{debug, info, warn};

use crate::domain::{CorrelatedPair, Record};
use crate::error::{ReconcileError, Result};
use crate::json_diff::{transform, Comparator, Comparison};
use crate::render::render_diff;
use crate::rules::RuleSet;

/// A correlated pair whose responses still differ after normalization.
#[derive(Debug, Clone)]
pub struct Mismatch {
    pub pair: CorrelatedPair,
    pub comparison: Comparison,
    /// Rendered textual diff, present when `beautifyDiff` is set.
    pub rendered: Option<String>,
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.pair.correlation_id, self.pair.endpoint)?;
        for difference in &self.comparison.differences {
            writeln!(f, "{}", difference)?;
        }
        if let Some(rendered) = &self.rendered {
            write!(f, "{}", rendered)?;
        }
        Ok(())
    }
}

/// Outcome of reconciling two record streams.
#[derive(Debug)]
pub struct BatchReport {
    /// Number of original records, the denominator of the error rate.
    pub total: usize,
    pub test_total: usize,
    /// Correlated pairs that did not match.
    pub errors: usize,
    pub mismatches: Vec<Mismatch>,
    /// Original records without a test counterpart.
    pub missing: Vec<ReconcileError>,
    pub allowed_errors_percent: f64,
}

impl BatchReport {
    /// `errors / total * 100`, zero for an empty batch.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.errors as f64 / self.total as f64 * 100.0
    }

    pub fn passed(&self) -> bool {
        self.error_rate() <= self.allowed_errors_percent
    }
}

impl Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Original data: {} entries", self.total)?;
        writeln!(f, "Test data: {} entries", self.test_total)?;

        for missing in &self.missing {
            writeln!(f, "Error: {}", missing)?;
        }
        for mismatch in &self.mismatches {
            write!(f, "{}", mismatch)?;
        }

        if self.passed() {
            write!(f, "Number of errors {} in {} entries", self.errors, self.total)
        } else {
            write!(
                f,
                "Error: Number of errors {} exceeded the allowed percent {}% in {} entries",
                self.errors, self.allowed_errors_percent, self.total
            )
        }
    }
}

/// Pairs original and test records by correlation id and compares each pair.
pub struct BatchReconciler<'r> {
    rules: &'r RuleSet,
    allowed_errors_percent: f64,
}

impl<'r> BatchReconciler<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self {
            rules,
            allowed_errors_percent: 0.0,
        }
    }

    pub fn with_allowed_errors_percent(mut self, percent: f64) -> Self {
        self.allowed_errors_percent = percent;
        self
    }

    pub fn reconcile(&self, originals: &[Record], tests: &[Record]) -> Result<BatchReport> {
        let by_correlation: HashMap<&str, &Record> = tests
            .iter()
            .map(|record| (record.correlation_id.as_str(), record))
            .collect();

        let mut report = BatchReport {
            total: originals.len(),
            test_total: tests.len(),
            errors: 0,
            mismatches: vec![],
            missing: vec![],
            allowed_errors_percent: self.allowed_errors_percent,
        };

        for original in originals {
            let Some(test) = by_correlation.get(original.correlation_id.as_str()) else {
                warn!(
                    correlation_id = %original.correlation_id,
                    "no matching test entry"
                );
                report.missing.push(ReconcileError::MissingCorrelation {
                    correlation_id: original.correlation_id.clone(),
                });
                continue;
            };

            let pair = CorrelatedPair::new(original, test);
            if let Some(mismatch) = self.compare_pair(pair)? {
                report.errors += 1;
                report.mismatches.push(mismatch);
            }
        }

        info!(
            total = report.total,
            errors = report.errors,
            missing = report.missing.len(),
            "batch reconciled"
        );
        Ok(report)
    }

    fn compare_pair(&self, pair: CorrelatedPair) -> Result<Option<Mismatch>> {
        if !pair.method.is_read() {
            debug!(
                correlation_id = %pair.correlation_id,
                method = %pair.method,
                "not a read request, skipping"
            );
            return Ok(None);
        }

        let mut original = pair.original_response.clone();
        let mut test = pair.test_response.clone();
        transform::normalize(&mut original, self.rules)?;
        transform::normalize(&mut test, self.rules)?;

        let comparison = Comparator::new(self.rules)
            .with_endpoint(&pair.endpoint)
            .normalized()
            .compare(&original, &test);
        if comparison.is_match() {
            return Ok(None);
        }

        let rendered = self
            .rules
            .beautify_diff
            .then(|| render_diff(&original, &test, self.rules));

        Ok(Some(Mismatch {
            pair,
            comparison,
            rendered,
        }))
    }
}
