//! TOML plan files.
//!
//! Raw settings mirror the file layout; [`resolve`](PlanFile::resolve)
//! applies `[defaults]`, validates, and turns check and threshold type
//! strings into tagged variants once, before anything runs.

use crate::error::ConfigError;
use crate::types::{
    Check, CheckKind, Expectation, HttpClientConfig, HttpRequest, Load, Plan, Scenario, Stage,
    Threshold, DEFAULT_MAX_IDLE_CONNS_PER_HOST,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

static ENV_VAR: LazyLock<regex_lite::Regex> =
    LazyLock::new(|| regex_lite::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

#[derive(Debug, Deserialize, Default)]
pub struct PlanFile {
    pub name: Option<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub http_client: HttpClientSettings,
    pub defaults: Option<ScenarioSettings>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HttpClientSettings {
    pub max_idle_conns_per_host: Option<usize>,
    #[serde(default)]
    pub disable_keep_alive: bool,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub disable_follow_redirects: bool,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ScenarioSettings {
    pub name: Option<String>,
    pub rps: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub duration: Option<Duration>,
    pub threads: Option<u32>,
    #[serde(default)]
    pub http_request: RequestSettings,
    #[serde(default)]
    pub stages: Vec<StageSettings>,
    #[serde(default)]
    pub checks: Vec<CheckSettings>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdSettings>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RequestSettings {
    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct StageSettings {
    pub name: Option<String>,
    pub rps: Option<u32>,
    pub threads: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub duration: Option<Duration>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckSettings {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub equals: Option<String>,
    pub contains: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdSettings {
    pub metric: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    pub min_count: Option<u64>,
    pub max_count: Option<u64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

/// Read, interpolate and resolve a plan file. The plan name falls back to
/// the file stem.
pub fn load_plan(path: &Path) -> Result<Plan, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let fallback = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "volley".to_string());

    parse_plan(&content, &fallback)
}

pub fn parse_plan(content: &str, fallback_name: &str) -> Result<Plan, ConfigError> {
    let content = interpolate_env_vars(content)?;
    let file: PlanFile = toml::from_str(&content)?;
    file.resolve(fallback_name)
}

fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = content.to_string();

    for cap in ENV_VAR.captures_iter(content) {
        let (Some(full_match), Some(var_expr)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_expr = var_expr.as_str();

        let (var_name, default) = match var_expr.find(":-") {
            Some(pos) => (&var_expr[..pos], Some(&var_expr[pos + 2..])),
            None => (var_expr, None),
        };

        let value = match std::env::var(var_name) {
            Ok(v) => v,
            Err(_) => match default {
                Some(d) => d.to_string(),
                None => return Err(ConfigError::MissingEnv(var_name.to_string())),
            },
        };

        result = result.replace(full_match.as_str(), &value);
    }

    Ok(result)
}

impl PlanFile {
    pub fn resolve(self, fallback_name: &str) -> Result<Plan, ConfigError> {
        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }

        let http_client = HttpClientConfig {
            max_idle_conns_per_host: self
                .http_client
                .max_idle_conns_per_host
                .unwrap_or(DEFAULT_MAX_IDLE_CONNS_PER_HOST),
            disable_keep_alive: self.http_client.disable_keep_alive,
            timeout: self.http_client.timeout.unwrap_or(DEFAULT_TIMEOUT),
            disable_follow_redirects: self.http_client.disable_follow_redirects,
        };

        let defaults = self.defaults.unwrap_or_default();
        let scenarios = self
            .scenarios
            .into_iter()
            .enumerate()
            .map(|(index, settings)| settings.with_defaults(&defaults).resolve(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Plan {
            name: self.name.unwrap_or_else(|| fallback_name.to_string()),
            parallel: self.parallel,
            http_client,
            scenarios,
        })
    }
}

impl ScenarioSettings {
    /// Unset scalars and an empty stage list come from `defaults`; checks,
    /// thresholds and missing headers are appended.
    pub fn with_defaults(mut self, defaults: &ScenarioSettings) -> Self {
        self.rps = self.rps.or(defaults.rps);
        self.duration = self.duration.or(defaults.duration);
        self.threads = self.threads.or(defaults.threads);

        let request = &mut self.http_request;
        let default_request = &defaults.http_request;
        request.url = request.url.take().or_else(|| default_request.url.clone());
        request.method = request.method.take().or_else(|| default_request.method.clone());
        request.body = request.body.take().or_else(|| default_request.body.clone());
        for (name, value) in &default_request.headers {
            if !request.headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
                request.headers.insert(name.clone(), value.clone());
            }
        }

        if self.stages.is_empty() {
            self.stages = defaults.stages.clone();
        }
        self.checks.extend(defaults.checks.iter().cloned());
        self.thresholds.extend(defaults.thresholds.iter().cloned());
        self
    }

    pub fn resolve(self, index: usize) -> Result<Scenario, ConfigError> {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("scenario-{}", index + 1));

        let request = self.http_request.resolve(&name)?;

        let load = if self.stages.is_empty() {
            Load::Constant {
                rps: self.rps.unwrap_or(1),
                duration: self.duration.unwrap_or_default(),
                threads: self.threads.unwrap_or(1),
            }
        } else {
            Load::Staged(
                self.stages
                    .into_iter()
                    .enumerate()
                    .map(|(i, stage)| Stage {
                        name: stage.name.unwrap_or_else(|| format!("{}-stage-{}", name, i + 1)),
                        rps: stage.rps.unwrap_or(1),
                        threads: stage.threads.or(self.threads).unwrap_or(1),
                        duration: stage.duration.unwrap_or_default(),
                    })
                    .collect(),
            )
        };

        let checks = self
            .checks
            .iter()
            .map(|c| c.resolve(&name))
            .collect::<Result<Vec<_>, _>>()?;

        let thresholds = self
            .thresholds
            .iter()
            .map(|t| t.resolve(&name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Scenario {
            name,
            load,
            request,
            checks,
            thresholds,
        })
    }
}

impl RequestSettings {
    fn resolve(self, scenario: &str) -> Result<HttpRequest, ConfigError> {
        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::invalid(scenario, "http_request.url is required"))?;

        let method_str = self.method.unwrap_or_else(|| "GET".to_string());
        let method = reqwest::Method::from_bytes(method_str.to_uppercase().as_bytes())
            .map_err(|_| ConfigError::invalid(scenario, format!("invalid HTTP method: {}", method_str)))?;

        Ok(HttpRequest {
            url,
            method,
            headers: self.headers.into_iter().collect(),
            body: self.body,
        })
    }
}

impl CheckSettings {
    fn resolve(&self, scenario: &str) -> Result<Check, ConfigError> {
        let kind: CheckKind = self
            .kind
            .parse()
            .map_err(|e: String| ConfigError::invalid(scenario, e))?;

        let expect = Expectation {
            equals: self.equals.clone(),
            contains: self.contains.clone(),
        };

        Ok(match kind {
            CheckKind::Code => Check::Code { expect },
            CheckKind::Body => Check::Body { expect },
            CheckKind::Header => {
                let name = self
                    .name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| ConfigError::invalid(scenario, "header check requires a name"))?;
                Check::Header { name, expect }
            }
        })
    }
}

impl ThresholdSettings {
    fn resolve(&self, scenario: &str) -> Result<Threshold, ConfigError> {
        match self.metric.as_str() {
            "checks" => {
                let kind = self
                    .kind
                    .parse()
                    .map_err(|e: String| ConfigError::invalid(scenario, e))?;
                Ok(Threshold::Checks {
                    kind,
                    min_rate: self.min_rate,
                    max_rate: self.max_rate,
                    min_count: self.min_count,
                    max_count: self.max_count,
                })
            }
            "latency" => {
                let percentile: f64 = self
                    .kind
                    .trim()
                    .trim_start_matches(['p', 'P'])
                    .parse()
                    .map_err(|_| {
                        ConfigError::invalid(
                            scenario,
                            format!("invalid latency percentile '{}'", self.kind),
                        )
                    })?;
                if !(percentile > 0.0 && percentile <= 100.0) {
                    return Err(ConfigError::invalid(
                        scenario,
                        format!("latency percentile must be in (0, 100], got {}", percentile),
                    ));
                }
                Ok(Threshold::Latency {
                    percentile,
                    min_value: self.min_value,
                    max_value: self.max_value,
                })
            }
            other => Err(ConfigError::invalid(
                scenario,
                format!("unknown threshold metric '{}'. Expected checks or latency", other),
            )),
        }
    }
}
