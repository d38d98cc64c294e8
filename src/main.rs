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

use clap::{Parser, ValueEnum};

use json_reconcile::logging;
use json_reconcile::{HttpMethod, ReconcileError, Reconciler, RuleSet};

const DEFAULT_CONFIG: &str = "./config.json";

#[doc(hidden)]
#[macro_export]
macro_rules! handle_error {
    ($code:expr, $msg:expr, $($arg:tt)*) => {
        println!($msg, $($arg)*);
        std::process::exit($code);
    };

    ($code:expr, $msg:expr) => {
        println!($msg);
        std::process::exit($code);
    };
}

#[doc(hidden)]
struct Code;

impl Code {
    const SUCCESS: i32 = 0;
    const INTERNAL_ERROR: i32 = 1;
    const INVALID_ARGUMENT: i32 = 2;
    const RECORD_PARSING_ERROR: i32 = 3;
    const RECONCILIATION_ERROR: i32 = 4;
}

#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Fetch one endpoint from two live services
    Url,
    /// Replay two captured record logs
    File,
}

#[doc(hidden)]
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Mode of operation
    #[clap(long, value_enum, default_value_t = Mode::Url)]
    mode: Mode,

    /// Original base URL in url mode, original log file in file mode
    #[clap(short, long)]
    original: String,

    /// Test base URL in url mode, test log file in file mode
    #[clap(short, long)]
    test: String,

    /// Endpoint appended to both base URLs
    #[clap(short, long, default_value = "")]
    endpoint: String,

    /// HTTP method used in url mode
    #[clap(short, long, default_value = "get")]
    method: HttpMethod,

    /// Number of retries after a mismatch
    #[clap(short, long, default_value_t = 0)]
    retry: usize,

    /// Number of replays
    #[clap(short, long, default_value_t = 1)]
    number: usize,

    /// Path to the rule set
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Share of mismatching records tolerated in file mode
    #[clap(long, env = "ALLOWED_ERRORS_PERCENT", default_value_t = 0.0)]
    allowed_errors_percent: f64,

    /// Increase log verbosity, repeat for more
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_rules(config: Option<&PathBuf>) -> Result<RuleSet, ReconcileError> {
    match config {
        Some(path) => RuleSet::from_file(path),
        None => match RuleSet::from_file(DEFAULT_CONFIG) {
            Err(ReconcileError::ConfigRead { .. }) => Ok(RuleSet::default()),
            result => result,
        },
    }
}

#[doc(hidden)]
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let rules = match load_rules(cli.config.as_ref()) {
        Ok(rules) => rules,
        Err(err) => {
            handle_error!(Code::INVALID_ARGUMENT, "Error: {}", err);
        }
    };

    let reconciler = Reconciler::new()
        .with_original(cli.original.as_str())
        .with_test(cli.test.as_str())
        .with_rules(rules)
        .with_retries(cli.retry)
        .with_replays(cli.number)
        .with_allowed_errors_percent(cli.allowed_errors_percent);

    match cli.mode {
        Mode::Url => match reconciler.compare_urls(&cli.endpoint, cli.method).await {
            Ok(report) if report.passed() => std::process::exit(Code::SUCCESS),
            Ok(report) => {
                handle_error!(Code::RECONCILIATION_ERROR, "{}", report);
            }
            Err(err) => exit_on(err),
        },
        Mode::File => match reconciler.reconcile_files() {
            Ok(report) if report.passed() => {
                println!("{}", report);
                std::process::exit(Code::SUCCESS);
            }
            Ok(report) => {
                handle_error!(Code::RECONCILIATION_ERROR, "{}", report);
            }
            Err(err) => exit_on(err),
        },
    }
}

fn exit_on(err: ReconcileError) -> ! {
    match err {
        ReconcileError::RecordInvalid { .. } | ReconcileError::RecordsRead { .. } => {
            handle_error!(Code::RECORD_PARSING_ERROR, "Error parsing records: {}", err);
        }
        ReconcileError::ConfigInvalid { .. }
        | ReconcileError::ConfigRead { .. }
        | ReconcileError::InvalidPattern { .. }
        | ReconcileError::MissingSource(_) => {
            handle_error!(Code::INVALID_ARGUMENT, "Error: {}", err);
        }
        _ => {
            handle_error!(Code::INTERNAL_ERROR, "Error: {}", err);
        }
    }
}
