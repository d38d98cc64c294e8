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

use std::sync::Once;

use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

static INIT_ONCE: Once = Once::new();

/// Installs the stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbosity` (the number of `-v` flags)
/// picks the level: none logs warnings, one adds progress, two or more add
/// every rule application. Calls after the first are ignored.
pub fn init(verbosity: u8) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .finish()
            .try_init();
    });
}

fn default_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    format!("json_reconcile={}", level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(0), "json_reconcile=warn");
        assert_eq!(default_directive(1), "json_reconcile=info");
        assert_eq!(default_directive(5), "json_reconcile=debug");
    }

    #[test]
    fn test_init_idempotent() {
        init(1);
        init(2);
    }
}
