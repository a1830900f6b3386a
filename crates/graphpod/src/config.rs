use std::env;

/// Everything the worker needs to bring the sandbox up. Binaries fill this
/// from the environment; tests construct it directly against stub servers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Backend LLM endpoint, POSTed to by the synchronous bridge.
    pub backend_url: String,
    /// Base URL the package installer fetches module sources from.
    pub registry_url: String,
    /// URL of the agent module source.
    pub agent_url: String,
    /// Name of the graph framework package to install at bootstrap.
    pub framework_package: String,
    /// Module name the agent source is written under inside the sandbox.
    pub agent_module: String,
    /// Entry-point function the agent module must export.
    pub entry_point: String,
    pub enable_logging: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000/llm".to_owned(),
            registry_url: "http://localhost:8000/packages".to_owned(),
            agent_url: "http://localhost:8000/agent.py".to_owned(),
            framework_package: "agentgraph".to_owned(),
            agent_module: "agent".to_owned(),
            entry_point: "run_graph".to_owned(),
            enable_logging: false,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_url: env_or("GRAPHPOD_BACKEND_URL", defaults.backend_url),
            registry_url: env_or("GRAPHPOD_REGISTRY_URL", defaults.registry_url),
            agent_url: env_or("GRAPHPOD_AGENT_URL", defaults.agent_url),
            framework_package: env_or("GRAPHPOD_FRAMEWORK_PACKAGE", defaults.framework_package),
            agent_module: env_or("GRAPHPOD_AGENT_MODULE", defaults.agent_module),
            entry_point: env_or("GRAPHPOD_ENTRY_POINT", defaults.entry_point),
            enable_logging: env::var("GRAPHPOD_LOG")
                .map(|value| parse_flag(&value))
                .unwrap_or(defaults.enable_logging),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
