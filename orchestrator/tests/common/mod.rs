//! Shared test doubles: scripted command runner, stub health probe, no-op sleep

// Not every test binary uses every helper
#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use shipwright::deploy::health::HealthProbe;
use shipwright::exec::{CommandOutput, CommandRunner, CommandSpec, SleepFn};

struct Rule {
    pattern: String,
    responses: VecDeque<CommandOutput>,
}

/// Command runner double: responses are matched by substring against the
/// displayed command line, consumed in order with the last one repeating.
/// Unmatched commands succeed with empty output. Every invocation is
/// recorded for call-count assertions.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(self, pattern: &str, responses: Vec<(bool, &str)>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            responses: responses
                .into_iter()
                .map(|(succeeded, output)| CommandOutput {
                    succeeded,
                    output: output.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| spec.display().contains(pattern))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutput {
        let line = spec.display();
        self.calls.lock().unwrap().push(spec.clone());

        let mut rules = self.rules.lock().unwrap();
        // Later rules take precedence, so tests can override a base script
        for rule in rules.iter_mut().rev() {
            if line.contains(&rule.pattern) {
                return if rule.responses.len() > 1 {
                    rule.responses.pop_front().unwrap()
                } else {
                    rule.responses
                        .front()
                        .cloned()
                        .unwrap_or_else(|| CommandOutput {
                            succeeded: true,
                            output: String::new(),
                        })
                };
            }
        }

        CommandOutput {
            succeeded: true,
            output: String::new(),
        }
    }
}

/// Health probe double: status codes consumed in order, last one repeating
pub struct StubProbe {
    codes: Mutex<VecDeque<u16>>,
    probes: Mutex<u32>,
}

impl StubProbe {
    pub fn new(codes: Vec<u16>) -> Self {
        Self {
            codes: Mutex::new(codes.into()),
            probes: Mutex::new(0),
        }
    }

    pub fn probe_count(&self) -> u32 {
        *self.probes.lock().unwrap()
    }
}

#[async_trait]
impl HealthProbe for StubProbe {
    async fn status(&self, _url: &str) -> u16 {
        *self.probes.lock().unwrap() += 1;
        let mut codes = self.codes.lock().unwrap();
        if codes.len() > 1 {
            codes.pop_front().unwrap()
        } else {
            codes.front().copied().unwrap_or(0)
        }
    }
}

/// Sleep implementation that returns immediately
pub fn no_sleep() -> SleepFn {
    Arc::new(|_wait| -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(async {}) })
}

/// Supabase project ref used across scripted outputs
pub const PROJECT_REF: &str = "abcdefghijklmnopqrst";

/// Scripted api-keys payload
pub const API_KEYS_JSON: &str = r#"[
    {"name": "anon", "api_key": "anon-key-1234"},
    {"name": "service_role", "api_key": "service-role-key-5678"}
]"#;
