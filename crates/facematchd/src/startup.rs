//! Process-level settings applied once from `main`, before any thread starts.

use crate::config::Config;

/// Log filter used when `RUST_LOG` is unset. Keeps ONNX Runtime quiet.
pub const DEFAULT_LOG_FILTER: &str = "info,ort=warn";

/// Environment variables the inference runtime reads at initialisation.
pub fn runtime_env(config: &Config) -> Vec<(&'static str, &'static str)> {
    let mut vars = Vec::new();
    if config.cpu_only {
        vars.push(("CUDA_VISIBLE_DEVICES", "-1"));
    }
    vars
}

/// Export [`runtime_env`] into the process environment.
///
/// Must run while the process is still single-threaded.
pub fn apply_runtime_env(config: &Config) {
    for (key, value) in runtime_env(config) {
        std::env::set_var(key, value);
    }
}
