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

use serde_json::Value;
use similar::TextDiff;

use crate::domain::HttpMethod;
use crate::rules::RuleSet;

const CONTEXT_LINES: usize = 3;

/// Line-oriented unified diff of two documents, pretty printed first.
///
/// Only the neighbourhood of each change is shown unless `showFullResponse`
/// is set, in which case every line of both documents is part of the output.
pub fn render_diff(original: &Value, test: &Value, rules: &RuleSet) -> String {
    let original = pretty(original);
    let test = pretty(test);

    let radius = if rules.show_full_response {
        original.lines().count().max(test.lines().count())
    } else {
        CONTEXT_LINES
    };

    TextDiff::from_lines(&original, &test)
        .unified_diff()
        .context_radius(radius)
        .header("original", "test")
        .to_string()
}

/// `METHOD endpoint` line printed above each reported mismatch.
pub fn endpoint_header(method: HttpMethod, endpoint: &str) -> String {
    format!("{} {}", method, endpoint)
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}
