//! Textual records printed by the compiled test binary.
//!
//! ```text
//! coverage(<totalProbes>;<hitProbes>)-r
//! coverresult(<passCount>;<failCount>;<elapsedSeconds>)-r
//! panic:(tested_func:<name>#<file>#<message>#<stack>)-c
//! ```
//!
//! Panic fields are escaped so a record always fits on one line:
//! `\` -> `\\`, newline -> `\n`, `#` -> `\#`.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    #[error("malformed wire record: {line}")]
    Malformed { line: String },

    #[error("bad number '{value}' in wire record")]
    BadNumber { value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireRecord {
    Coverage {
        total: u32,
        hit: u32,
    },
    CoverResult {
        passed: u32,
        failed: u32,
        elapsed_secs: f64,
    },
    Panic {
        function: String,
        file: String,
        message: String,
        stack: String,
    },
}

const COVERAGE_PREFIX: &str = "coverage(";
const RESULT_PREFIX: &str = "coverresult(";
const RECORD_SUFFIX: &str = ")-r";
const PANIC_PREFIX: &str = "panic:(tested_func:";
const PANIC_SUFFIX: &str = ")-c";

impl fmt::Display for WireRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireRecord::Coverage { total, hit } => {
                write!(f, "{COVERAGE_PREFIX}{total};{hit}{RECORD_SUFFIX}")
            }
            WireRecord::CoverResult {
                passed,
                failed,
                elapsed_secs,
            } => write!(
                f,
                "{RESULT_PREFIX}{passed};{failed};{elapsed_secs:.3}{RECORD_SUFFIX}"
            ),
            WireRecord::Panic {
                function,
                file,
                message,
                stack,
            } => write!(
                f,
                "{PANIC_PREFIX}{}#{}#{}#{}{PANIC_SUFFIX}",
                escape_field(function),
                escape_field(file),
                escape_field(message),
                escape_field(stack)
            ),
        }
    }
}

impl FromStr for WireRecord {
    type Err = WireError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || WireError::Malformed {
            line: line.to_string(),
        };
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(body) = line
            .strip_prefix(PANIC_PREFIX)
            .and_then(|rest| rest.strip_suffix(PANIC_SUFFIX))
        {
            let fields = split_escaped(body);
            let [function, file, message, stack]: [String; 4] =
                fields.try_into().map_err(|_| malformed())?;
            return Ok(WireRecord::Panic {
                function,
                file,
                message,
                stack,
            });
        }

        if let Some(body) = line
            .strip_prefix(RESULT_PREFIX)
            .and_then(|rest| rest.strip_suffix(RECORD_SUFFIX))
        {
            let parts: Vec<&str> = body.split(';').collect();
            if parts.len() != 3 {
                return Err(malformed());
            }
            return Ok(WireRecord::CoverResult {
                passed: parse_number(parts[0])?,
                failed: parse_number(parts[1])?,
                elapsed_secs: parse_number(parts[2])?,
            });
        }

        if let Some(body) = line
            .strip_prefix(COVERAGE_PREFIX)
            .and_then(|rest| rest.strip_suffix(RECORD_SUFFIX))
        {
            let (total, hit) = body.split_once(';').ok_or_else(malformed)?;
            return Ok(WireRecord::Coverage {
                total: parse_number(total)?,
                hit: parse_number(hit)?,
            });
        }

        Err(malformed())
    }
}

/// Extract every wire record from a test binary's stdout, ignoring the
/// test harness's own chatter.
pub fn parse_output(stdout: &str) -> Vec<WireRecord> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with(COVERAGE_PREFIX)
                || line.starts_with(RESULT_PREFIX)
                || line.starts_with(PANIC_PREFIX)
        })
        .filter_map(|line| line.parse().ok())
        .collect()
}

fn parse_number<T: FromStr>(value: &str) -> Result<T, WireError> {
    value.trim().parse().map_err(|_| WireError::BadNumber {
        value: value.to_string(),
    })
}

pub fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '#' => out.push_str("\\#"),
            other => out.push(other),
        }
    }
    out
}

/// Split on unescaped `#` and unescape each field.
fn split_escaped(body: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            '#' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}
