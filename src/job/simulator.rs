//! Simulator and analyzer definitions.
//!
//! These are thin, lookup-only views of the external catalog: enough to
//! resolve a job's command line and pre-process scripts at creation time.
//! Simulators that declare `support_input_json` receive their parameters as
//! a JSON payload (with the seed injected as `_seed`); others receive them
//! positionally on the command line, seed last.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::job::Executable;

/// A simulator definition: the command to run and how it takes parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulator {
    pub name: String,
    pub command: String,
    /// Whether parameters are passed as a `_input.json` payload instead of
    /// positional arguments.
    #[serde(default)]
    pub support_input_json: bool,
    /// Parameter names in positional order (used when `support_input_json`
    /// is false).
    #[serde(default)]
    pub parameter_keys: Vec<String>,
    #[serde(default)]
    pub local_pre_process_script: Option<String>,
    #[serde(default)]
    pub pre_process_script: Option<String>,
    #[serde(default)]
    pub analyzers: Vec<Analyzer>,
}

/// An analyzer attached to a simulator, applied to finished runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analyzer {
    pub id: Uuid,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub parameter_keys: Vec<String>,
    #[serde(default)]
    pub pre_process_script: Option<String>,
}

impl Simulator {
    pub fn new(name: String, command: String) -> Self {
        Self {
            name,
            command,
            support_input_json: false,
            parameter_keys: Vec::new(),
            local_pre_process_script: None,
            pre_process_script: None,
            analyzers: Vec::new(),
        }
    }

    pub fn with_support_input_json(mut self, support: bool) -> Self {
        self.support_input_json = support;
        self
    }

    pub fn with_parameter_keys(mut self, keys: Vec<String>) -> Self {
        self.parameter_keys = keys;
        self
    }

    pub fn with_local_pre_process_script(mut self, script: String) -> Self {
        self.local_pre_process_script = Some(script);
        self
    }

    pub fn with_pre_process_script(mut self, script: String) -> Self {
        self.pre_process_script = Some(script);
        self
    }

    /// Registers an analyzer and returns its id.
    pub fn add_analyzer(
        &mut self,
        name: String,
        command: String,
        parameter_keys: Vec<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.analyzers.push(Analyzer {
            id,
            name,
            command,
            parameter_keys,
            pre_process_script: None,
        });
        id
    }

    /// Resolves an analyzer by id. Weak reference: absence is not an error
    /// at this level.
    pub fn analyzer(&self, id: Uuid) -> Option<&Analyzer> {
        self.analyzers.iter().find(|a| a.id == id)
    }

    /// Builds the command line and input payload for a run with the given
    /// parameter values and seed.
    pub fn executable_for_run(
        &self,
        v: &HashMap<String, Value>,
        seed: u64,
    ) -> (Executable, Option<Value>) {
        let (command, input) = self.command_and_input(v, seed);
        (
            Executable {
                command,
                local_pre_process_script: self.local_pre_process_script.clone(),
                pre_process_script: self.pre_process_script.clone(),
            },
            input,
        )
    }

    fn command_and_input(&self, v: &HashMap<String, Value>, seed: u64) -> (String, Option<Value>) {
        if self.support_input_json {
            let mut input = serde_json::Map::new();
            for (key, value) in v {
                input.insert(key.clone(), value.clone());
            }
            input.insert("_seed".to_string(), Value::from(seed));
            (self.command.clone(), Some(Value::Object(input)))
        } else {
            let mut parts = vec![self.command.clone()];
            for key in &self.parameter_keys {
                parts.push(render_arg(v.get(key)));
            }
            parts.push(seed.to_string());
            (parts.join(" "), None)
        }
    }
}

impl Analyzer {
    /// Builds the executable snapshot for an analysis with the given
    /// parameters, passed positionally in `parameter_keys` order.
    pub fn executable(&self, parameters: &HashMap<String, Value>) -> Executable {
        let mut parts = vec![self.command.clone()];
        for key in &self.parameter_keys {
            parts.push(render_arg(parameters.get(key)));
        }
        Executable {
            command: parts.join(" "),
            local_pre_process_script: None,
            pre_process_script: self.pre_process_script.clone(),
        }
    }
}

/// Renders a JSON parameter value as a shell argument. Strings are passed
/// bare (matching how existing simulator wrappers are invoked).
fn render_arg(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
