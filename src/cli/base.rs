//! Shared pieces of the `zencli` subcommands: printing of results, exit
//! codes and parsing of `key=value` replacements.

use std::collections::HashMap;

use atty::Stream;
use colored::Colorize;
use colored_json::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

use crate::client::BaseClient;
use crate::error::{Result, ZenodoError};

/// Trait for processing CLI subcommands
///
/// Implementors define how to handle their specific subcommand variant
/// using the provided API client.
pub trait Matcher {
    fn process(self, client: &BaseClient);
}

/// Prints the result of a command and exits with the matching code.
///
/// When stdout is a terminal, the JSON is colored and preceded by a success
/// header. Otherwise only the plain JSON is written so that the output can
/// be piped into other tools.
pub fn evaluate_and_print<T: Serialize>(result: Result<T>) {
    match result.and_then(|data| Ok(serde_json::to_string_pretty(&data)?)) {
        Ok(json) => {
            if atty::is(Stream::Stdout) {
                println!("{}", success_message());
                let colored = json.to_colored_json_auto().unwrap_or(json);
                println!("{colored}\n");
            } else {
                println!("{json}");
            }
            std::process::exit(exitcode::OK);
        }
        Err(error) => exit_with_error(&error),
    }
}

/// Prints `error` and exits with a code describing its kind.
pub fn exit_with_error(error: &ZenodoError) -> ! {
    eprintln!("\n{} {}\n", "Error:".red().bold(), error);
    std::process::exit(exit_code(error));
}

fn exit_code(error: &ZenodoError) -> exitcode::ExitCode {
    match error {
        ZenodoError::InvalidArgument(_)
        | ZenodoError::InvalidPlaceholder(_)
        | ZenodoError::MissingPlaceholders(_)
        | ZenodoError::PendingPlaceholders { .. } => exitcode::USAGE,
        ZenodoError::InvalidManifest(_)
        | ZenodoError::Json(_)
        | ZenodoError::Yaml(_)
        | ZenodoError::DuplicateFilename(_) => exitcode::DATAERR,
        ZenodoError::InvalidFile(_) | ZenodoError::InvalidDirectory(_) => exitcode::NOINPUT,
        ZenodoError::Io(_) => exitcode::IOERR,
        ZenodoError::Http(_) | ZenodoError::UploadFailed { .. } => exitcode::UNAVAILABLE,
        _ => exitcode::SOFTWARE,
    }
}

/// Runtime driving the async API from a subcommand.
pub fn runtime() -> Runtime {
    match Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => exit_with_error(&ZenodoError::from(error)),
    }
}

/// Parses `key=value` pairs into placeholder replacements.
///
/// Values are read as JSON when possible (`count=3`, `tags=["a","b"]`) and
/// kept as strings otherwise.
pub fn parse_replacements(pairs: &[String]) -> Result<HashMap<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ZenodoError::InvalidArgument(format!(
                    "Replacement '{pair}' must have the form 'key=value'"
                ))
            })?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

fn success_message() -> String {
    format!(
        "{} {} - Received the following response: \n",
        "└── ".bold(),
        "Success!".green().bold()
    )
}
