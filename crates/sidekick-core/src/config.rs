use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

pub const ENV_API_BASE: &str = "AI_AGENT_API_BASE";
pub const ENV_MODEL: &str = "AI_AGENT_MODEL";
pub const ENV_API_KEY: &str = "AI_AGENT_API_KEY";

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"
You are an expert software developer agent. Your goal is to help the user with their coding tasks by generating, editing, and testing files.

You must respond with a JSON object containing a list of actions to perform.
Each action is an object with a "command" key.

The available commands are:
1. "create_file": Creates a new file. Requires "path" and "content" keys.
2. "edit_file": Overwrites an existing file. Requires "path" and "content" keys.
3. "test": Runs a validation command in the shell. Requires a "test_command" key. The command should be simple and directly test the functionality of the code you just wrote.

If the user's request is not a coding task (e.g., a question, a poem), respond with a simple text answer without the JSON structure.

Example user request: "Create a python script that prints the 10th fibonacci number."
Your JSON response should be:
```json
{
  "actions": [
    {
      "command": "create_file",
      "path": "fibonacci.py",
      "content": "def fib(n):\n    a, b = 0, 1\n    for _ in range(n):\n        a, b = b, a + b\n    return a\n\nprint(fib(10))"
    },
    {
      "command": "test",
      "test_command": "python fibonacci.py"
    }
  ]
}
```

Now, fulfill the user's request.
"#;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub runner: RunnerConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:1234/v1".to_string(),
            model: "default-model".to_string(),
            api_key: "dummy-key".to_string(),
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Hard ceiling applied to each test command separately.
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Loads a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlays the `AI_AGENT_*` variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(api_base) = var(ENV_API_BASE) {
            self.provider.api_base = api_base;
        }
        if let Some(model) = var(ENV_MODEL) {
            self.provider.model = model;
        }
        if let Some(api_key) = var(ENV_API_KEY) {
            self.provider.api_key = api_key;
        }
    }
}
