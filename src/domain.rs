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
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Read requests are idempotent and safe to replay for diffing.
    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Head => write!(f, "HEAD"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(format!("{} is not a valid http method", s)),
        }
    }
}

/// One captured request/response line of a replay log.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: String,
    pub time: String,
    pub correlation_id: String,
    pub method: HttpMethod,
    pub endpoint: String,
    pub response: Value,
    pub line_number: usize,
}

/// An original record joined with the test record sharing its correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedPair {
    pub correlation_id: String,
    pub method: HttpMethod,
    pub endpoint: String,
    pub original_response: Value,
    pub test_response: Value,
}

impl CorrelatedPair {
    pub fn new(original: &Record, test: &Record) -> Self {
        Self {
            correlation_id: original.correlation_id.clone(),
            method: original.method,
            endpoint: original.endpoint.clone(),
            original_response: original.response.clone(),
            test_response: test.response.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
        assert!("TRACE".parse::<HttpMethod>().is_err());

        assert!(HttpMethod::Get.is_read());
        assert!(HttpMethod::Head.is_read());
        assert!(!HttpMethod::Post.is_read());
    }
}
