// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use std::collections::BTreeMap;
use std::time::Instant;

use deckhand::model::{DeploymentResult, DeploymentStatus};
use deckhand::orchestrator::OrchestrationResult;
use serde::Serialize;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.duration() {
                Some(elapsed) => println!("{message} ({elapsed:.1}s)"),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.event("success", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    fn event(&self, event: &str, message: &str) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.duration(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            println!("{json}");
        }
    }

    /// Print a value as one JSON line.
    fn json<T: Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            println!("{json}");
        }
    }

    /// Report one operation result.
    pub fn result(&self, result: &DeploymentResult) {
        match self.mode {
            OutputMode::Json => self.json(result),
            OutputMode::Normal => {
                let mark = if result.success { "✓" } else { "✗" };
                println!(
                    "  {mark} {} [{}] {}",
                    result.deployment_id, result.status.phase, result.message
                );
                for (key, value) in &result.metadata {
                    println!("      {key}: {value}");
                }
            }
            OutputMode::Quiet => {
                if !result.success {
                    eprintln!("{}: {}", result.deployment_id, result.message);
                }
            }
        }
    }

    /// Report a batch, one line per deployment and a summary.
    pub fn batch(&self, outcome: &OrchestrationResult) {
        if self.mode == OutputMode::Json {
            self.json(outcome);
            return;
        }
        for step in &outcome.steps {
            self.progress(&format!("  → {step}"));
        }
        for result in &outcome.results {
            self.result(result);
        }
        if outcome.success {
            self.success(&outcome.message);
        }
    }

    pub fn statuses(&self, statuses: &BTreeMap<String, DeploymentStatus>) {
        if self.mode == OutputMode::Json {
            self.json(statuses);
            return;
        }
        if statuses.is_empty() {
            println!("No deployments registered");
            return;
        }
        for (id, status) in statuses {
            let r = &status.replicas;
            println!(
                "{id:<24} {:<10} {}/{} ready",
                status.phase.to_string(),
                r.ready,
                r.desired
            );
            if self.mode == OutputMode::Normal {
                for condition in &status.conditions {
                    if let Some(message) = &condition.message {
                        println!("    {}: {message}", condition.condition_type);
                    }
                }
            }
        }
    }

    pub fn detail<T: Serialize>(&self, label: &str, value: &T) {
        match self.mode {
            OutputMode::Json => self.json(value),
            OutputMode::Normal | OutputMode::Quiet => {
                if let Ok(yaml) = serde_yaml::to_string(value) {
                    println!("{label}:");
                    for line in yaml.lines() {
                        println!("  {line}");
                    }
                }
            }
        }
    }

    pub fn lines(&self, lines: &[String]) {
        if self.mode == OutputMode::Json {
            self.json(&lines);
            return;
        }
        for line in lines {
            println!("{line}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
