//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, FijiConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local override and is returned
/// even when missing. Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/fiji-mcp/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("fiji-mcp/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // An explicit path replaces the local override and must exist;
    // reading it reports FileRead when it does not
    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("fiji-mcp.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents
        .parse::<toml::Table>()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key;
/// everything else (including arrays) is replaced wholesale.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a typed config. Missing keys take their defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<FijiConfig, ConfigError> {
    let mut config = toml::Value::Table(table)
        .try_into::<FijiConfig>()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

    if let Some(java_home) = config.host.java_home.take() {
        config.host.java_home = Some(expand_path(&java_home.to_string_lossy()));
    }

    Ok(config)
}

/// Parse config from a TOML string.
pub fn parse_toml(contents: &str, path: &Path) -> Result<FijiConfig, ConfigError> {
    let table = contents
        .parse::<toml::Table>()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    from_table(table, path)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut FijiConfig, sources: &mut ConfigSources) {
    apply_overrides_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides_with<F>(config: &mut FijiConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Only overrides that actually changed the config are recorded
    let mut applied = Vec::new();

    // Bind address
    if let Some(v) = lookup("FIJI_MCP_HTTP_ADDR") {
        config.bind.http_addr = v;
        applied.push("FIJI_MCP_HTTP_ADDR");
    }
    if let Some(port) = lookup("FIJI_MCP_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.bind.http_port = port;
        applied.push("FIJI_MCP_HTTP_PORT");
    }

    // Telemetry
    if let Some(v) = lookup("FIJI_MCP_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        applied.push("FIJI_MCP_OTLP_ENDPOINT");
    }
    // Also support standard OTEL env var
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        applied.push("OTEL_EXPORTER_OTLP_ENDPOINT");
    }
    if let Some(v) = lookup("FIJI_MCP_LOG_LEVEL") {
        config.telemetry.log_level = v;
        applied.push("FIJI_MCP_LOG_LEVEL");
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        applied.push("RUST_LOG");
    }

    // Host
    if let Some(backend) = lookup("FIJI_MCP_HOST").and_then(|v| v.parse().ok()) {
        config.host.backend = backend;
        applied.push("FIJI_MCP_HOST");
    }
    if let Some(mode) = lookup("FIJI_MCP_MODE").and_then(|v| v.parse().ok()) {
        config.host.mode = mode;
        applied.push("FIJI_MCP_MODE");
    }
    if let Some(v) = lookup("FIJI_MCP_BRIDGE_COMMAND") {
        config.host.bridge.command = v;
        applied.push("FIJI_MCP_BRIDGE_COMMAND");
    }
    if let Some(v) = lookup("FIJI_MCP_DEPENDENCIES") {
        config.host.dependencies = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        applied.push("FIJI_MCP_DEPENDENCIES");
    }
    // An explicit java_home in a config file wins over the inherited JAVA_HOME
    if config.host.java_home.is_none() {
        if let Some(v) = lookup("JAVA_HOME") {
            config.host.java_home = Some(expand_path(&v));
            applied.push("JAVA_HOME");
        }
    }

    sources
        .env_overrides
        .extend(applied.into_iter().map(String::from));
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostBackend, LaunchMode};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[bind]
http_port = 9000
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.bind.http_port, 9000);
        // Other values should be defaults
        assert_eq!(config.bind.http_addr, "127.0.0.1");
        assert_eq!(config.host.backend, HostBackend::Bridge);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[bind]
http_addr = "0.0.0.0"
http_port = 9000

[telemetry]
otlp_endpoint = "collector:4317"
log_level = "debug"

[host]
backend = "sandbox"
mode = "headless"
show_ui = false
eager = false
java_home = "/opt/jdk-11"
dependencies = ["net.imagej:imagej:2.16.0"]

[host.bridge]
command = "/opt/fiji/bridge"
args = ["--verbose"]
startup_timeout_ms = 5000

[host.sandbox]
timeout_ms = 1000
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.bind.socket_addr(), "0.0.0.0:9000");
        assert_eq!(config.telemetry.otlp_endpoint.as_deref(), Some("collector:4317"));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.host.backend, HostBackend::Sandbox);
        assert_eq!(config.host.mode, LaunchMode::Headless);
        assert!(!config.host.show_ui);
        assert!(!config.host.eager);
        assert_eq!(config.host.java_home, Some(PathBuf::from("/opt/jdk-11")));
        assert_eq!(config.host.dependencies, vec!["net.imagej:imagej:2.16.0"]);
        assert_eq!(config.host.bridge.args, vec!["--verbose"]);
        assert_eq!(config.host.bridge.startup_timeout_ms, 5000);
        assert_eq!(config.host.sandbox.timeout_ms, 1000);
    }

    #[test]
    fn test_parse_rejects_bad_backend() {
        let toml = r#"
[host]
backend = "jvm"
"#;
        let err = parse_toml(toml, Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base: toml::Table = r#"
[host]
mode = "gui"

[host.bridge]
command = "system-bridge"
startup_timeout_ms = 1000
"#
        .parse()
        .unwrap();
        let overlay: toml::Table = r#"
[host.bridge]
command = "local-bridge"
"#
        .parse()
        .unwrap();

        merge_tables(&mut base, overlay);
        let config = from_table(base, Path::new("merged")).unwrap();

        assert_eq!(config.host.mode, LaunchMode::Gui);
        assert_eq!(config.host.bridge.command, "local-bridge");
        assert_eq!(config.host.bridge.startup_timeout_ms, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FijiConfig::default();
        let mut sources = ConfigSources::default();

        apply_overrides_with(
            &mut config,
            &mut sources,
            lookup(&[
                ("FIJI_MCP_HTTP_PORT", "7777"),
                ("FIJI_MCP_HOST", "sandbox"),
                ("FIJI_MCP_DEPENDENCIES", "a:b:1, c:d:2 ,"),
                ("RUST_LOG", "fiji_mcp=trace"),
                ("JAVA_HOME", "/usr/lib/jvm/java-11"),
            ]),
        );

        assert_eq!(config.bind.http_port, 7777);
        assert_eq!(config.host.backend, HostBackend::Sandbox);
        assert_eq!(config.host.dependencies, vec!["a:b:1", "c:d:2"]);
        assert_eq!(config.telemetry.log_level, "fiji_mcp=trace");
        assert_eq!(
            config.host.java_home,
            Some(PathBuf::from("/usr/lib/jvm/java-11"))
        );
        assert_eq!(sources.env_overrides.len(), 5);
    }

    #[test]
    fn test_unparsable_overrides_are_not_recorded() {
        let mut config = FijiConfig::default();
        let mut sources = ConfigSources::default();

        apply_overrides_with(
            &mut config,
            &mut sources,
            lookup(&[
                ("FIJI_MCP_HTTP_PORT", "eighty"),
                ("FIJI_MCP_HOST", "jvm"),
                ("FIJI_MCP_MODE", "fullscreen"),
                ("FIJI_MCP_BRIDGE_COMMAND", "/opt/fiji/bridge"),
            ]),
        );

        assert_eq!(config.bind.http_port, 8090);
        assert_eq!(config.host.backend, HostBackend::Bridge);
        assert_eq!(config.host.mode, LaunchMode::Interactive);
        assert_eq!(config.host.bridge.command, "/opt/fiji/bridge");
        assert_eq!(sources.env_overrides, vec!["FIJI_MCP_BRIDGE_COMMAND"]);
    }

    #[test]
    fn test_explicit_config_path_is_kept_when_missing() {
        let missing = Path::new("/nonexistent/fiji-mcp-test.toml");
        let files = discover_config_files_with_override(Some(missing));
        assert_eq!(files.last().map(PathBuf::as_path), Some(missing));
    }

    #[test]
    fn test_config_java_home_beats_inherited_env() {
        let mut config = FijiConfig::default();
        config.host.java_home = Some(PathBuf::from("/from/config"));
        let mut sources = ConfigSources::default();

        apply_overrides_with(&mut config, &mut sources, lookup(&[("JAVA_HOME", "/from/env")]));

        assert_eq!(config.host.java_home, Some(PathBuf::from("/from/config")));
        assert!(sources.env_overrides.is_empty());
    }
}
