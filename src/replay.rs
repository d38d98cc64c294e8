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

//! Parser for captured replay logs.
//!
//! Each record is one line: `DATE TIME [CORRELATION_ID] METHOD ENDPOINT JSON_BODY`,
//! whitespace separated, with the JSON body taking the rest of the line.
//! Lines that do not follow this grammar (log noise, blank lines) are skipped.

use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::domain::{HttpMethod, Record};
use crate::error::{ReconcileError, Result};

const RECORD_LINE: &str = r"^(\S+)\s+(\S+)\s+\[(\S+)\]\s+(\S+)\s+(\S+)\s+(.+)$";

pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ReconcileError::RecordsRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&content, path)
}

/// Parses records from `content`; `file` only labels errors.
pub fn parse_str(content: &str, file: &Path) -> Result<Vec<Record>> {
    let re = Regex::new(RECORD_LINE).map_err(|err| ReconcileError::InvalidPattern {
        pattern: RECORD_LINE.to_string(),
        reason: err.to_string(),
    })?;

    let mut records = vec![];
    for (mut line_no, line) in content.lines().enumerate() {
        line_no += 1;
        let Some(caps) = re.captures(line.trim_end()) else {
            if !line.trim().is_empty() {
                debug!(file = %file.display(), line = line_no, "skipping non-record line");
            }
            continue;
        };

        let invalid = |reason: String| ReconcileError::RecordInvalid {
            file: file.to_path_buf(),
            line: line_no,
            reason,
        };

        let method = caps[4].parse::<HttpMethod>().map_err(invalid)?;
        let response = serde_json::from_str(&caps[6])
            .map_err(|err| invalid(format!("response is not valid JSON: {}", err)))?;

        records.push(Record {
            date: caps[1].to_string(),
            time: caps[2].to_string(),
            correlation_id: caps[3].to_string(),
            method,
            endpoint: caps[5].to_string(),
            response,
            line_number: line_no,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn label() -> PathBuf {
        PathBuf::from("test.log")
    }

    #[test]
    fn test_parse_records() {
        let content = "\
2024-03-01 10:00:00.123 [abc-1] GET /api/tokens?limit=2 {\"tokens\": [1, 2]}
some unrelated log line
2024-03-01 10:00:01.456 [abc-2] post /api/orders {\"id\": 7, \"note\": \"a b c\"}

";
        let records = parse_str(content, &label()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].date, "2024-03-01");
        assert_eq!(records[0].time, "10:00:00.123");
        assert_eq!(records[0].correlation_id, "abc-1");
        assert_eq!(records[0].method, HttpMethod::Get);
        assert_eq!(records[0].endpoint, "/api/tokens?limit=2");
        assert_eq!(records[0].response, json!({ "tokens": [1, 2] }));
        assert_eq!(records[0].line_number, 1);

        assert_eq!(records[1].method, HttpMethod::Post);
        assert_eq!(records[1].response, json!({ "id": 7, "note": "a b c" }));
        assert_eq!(records[1].line_number, 3);
    }

    #[test]
    fn test_invalid_json_body() {
        let content = "2024-03-01 10:00:00 [x] GET /a {not json}";
        match parse_str(content, &label()) {
            Err(ReconcileError::RecordInvalid { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_method() {
        let content = "2024-03-01 10:00:00 [x] FETCH /a {}";
        assert!(matches!(
            parse_str(content, &label()),
            Err(ReconcileError::RecordInvalid { .. })
        ));
    }

    #[test]
    fn test_fixture_files() {
        let original = parse_file("tests/data/original.log").unwrap();
        let test = parse_file("tests/data/test.log").unwrap();
        assert_eq!(original.len(), 4);
        assert_eq!(test.len(), 3);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            parse_file("tests/data/missing.log"),
            Err(ReconcileError::RecordsRead { .. })
        ));
    }
}
