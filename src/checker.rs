//! Declarative response checks.
//!
//! Every check produces a [`CheckResult`]; the response passes when all
//! checks pass. Bodies are compared in full but only a truncated copy is
//! kept as the recorded value.

use crate::http::CapturedResponse;
use crate::types::{Check, Expectation};

const MAX_BODY_LENGTH: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    pub actual: String,
    pub pass: bool,
    pub error: Option<String>,
}

pub struct Checker<'a> {
    checks: &'a [Check],
}

impl<'a> Checker<'a> {
    pub fn new(checks: &'a [Check]) -> Self {
        Self { checks }
    }

    /// Runs every check in order. An empty list passes.
    pub fn validate(&self, response: &CapturedResponse) -> (Vec<CheckResult>, bool) {
        let results: Vec<CheckResult> = self
            .checks
            .iter()
            .map(|check| run_check(check, response))
            .collect();
        let success = results.iter().all(|r| r.pass);
        (results, success)
    }
}

pub fn run_check(check: &Check, response: &CapturedResponse) -> CheckResult {
    match check {
        Check::Code { expect } => check_code(expect, response),
        Check::Header { name, expect } => check_header(name, expect, response),
        Check::Body { expect } => check_body(expect, response),
    }
}

fn check_code(expect: &Expectation, response: &CapturedResponse) -> CheckResult {
    let actual = response.status.to_string();
    CheckResult {
        pass: expect.matches(&actual),
        actual,
        error: None,
    }
}

fn check_header(name: &str, expect: &Expectation, response: &CapturedResponse) -> CheckResult {
    let actual = response
        .headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    CheckResult {
        pass: expect.matches(&actual),
        actual,
        error: None,
    }
}

fn check_body(expect: &Expectation, response: &CapturedResponse) -> CheckResult {
    match &response.body {
        Ok(body) => CheckResult {
            actual: truncate_body(body),
            pass: expect.matches(body),
            error: None,
        },
        Err(e) => CheckResult {
            actual: String::new(),
            pass: false,
            error: Some(e.clone()),
        },
    }
}

pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_LENGTH) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
