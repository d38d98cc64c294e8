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

use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::HttpMethod;
use crate::error::Result;
use crate::fetch::fetch_document;
use crate::json_diff::{transform, Comparator, Comparison};
use crate::rules::RuleSet;

/// Live comparison target: two base URLs sharing one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub original_url: &'a str,
    pub test_url: &'a str,
    pub endpoint: &'a str,
    pub method: HttpMethod,
}

/// Final attempt of one replay.
#[derive(Debug, Clone)]
pub struct EndpointOutcome {
    /// Zero-based replay index.
    pub replay: usize,
    /// Number of fetch/compare cycles it took, at least one.
    pub attempts: usize,
    /// Normalized documents of the final attempt.
    pub original: Value,
    pub test: Value,
    pub comparison: Comparison,
}

impl EndpointOutcome {
    pub fn is_match(&self) -> bool {
        self.comparison.is_match()
    }
}

/// Repeats fetch, normalize and compare while a mismatch is found and the
/// retry budget lasts. Every replay runs the whole cycle again.
#[derive(Debug, Clone)]
pub struct RetryController<'r> {
    client: Client,
    rules: &'r RuleSet,
    retries: usize,
    replays: usize,
}

impl<'r> RetryController<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self {
            client: Client::new(),
            rules,
            retries: 0,
            replays: 1,
        }
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_replays(mut self, replays: usize) -> Self {
        self.replays = replays;
        self
    }

    pub async fn run(&self, target: Target<'_>) -> Result<Vec<EndpointOutcome>> {
        let mut outcomes = Vec::with_capacity(self.replays);
        for replay in 0..self.replays {
            info!(replay = replay + 1, of = self.replays, endpoint = target.endpoint, "replay");
            outcomes.push(self.run_once(target, replay).await?);
        }
        Ok(outcomes)
    }

    async fn run_once(&self, target: Target<'_>, replay: usize) -> Result<EndpointOutcome> {
        let original_url = format!("{}{}", target.original_url, target.endpoint);
        let test_url = format!("{}{}", target.test_url, target.endpoint);
        let comparator = Comparator::new(self.rules)
            .with_endpoint(target.endpoint)
            .normalized();

        let mut attempts = 0;
        loop {
            attempts += 1;

            let (mut original, mut test) = tokio::join!(
                fetch_document(&self.client, &original_url, target.method),
                fetch_document(&self.client, &test_url, target.method),
            );
            transform::normalize(&mut original, self.rules)?;
            transform::normalize(&mut test, self.rules)?;
            let comparison = comparator.compare(&original, &test);

            if comparison.is_match() || attempts > self.retries {
                return Ok(EndpointOutcome {
                    replay,
                    attempts,
                    original,
                    test,
                    comparison,
                });
            }

            warn!(
                endpoint = target.endpoint,
                differences = comparison.statistics.total_differences,
                "Retrying {} time",
                attempts
            );
        }
    }
}
