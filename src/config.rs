use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::error::{ConfigError, ConfigResult};

/// Default listen address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";

/// Tool name searched on `PATH` when no path is configured
pub const DEFAULT_TOOL_NAME: &str = "exiftool";

/// How long shutdown waits for in-flight streams
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(45);

pub const ENV_BIND_ADDRESS: &str = "TAGINFO_BIND_ADDRESS";
pub const ENV_EXIFTOOL: &str = "TAGINFO_EXIFTOOL";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Resolved service configuration, built once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub exiftool: PathBuf,
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    pub fn new(bind_address: SocketAddr, exiftool: impl Into<PathBuf>) -> Self {
        Self {
            bind_address,
            exiftool: exiftool.into(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Raw settings gathered from the environment and the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub bind_address: Option<String>,
    pub exiftool: Option<PathBuf>,
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> environment -> CLI
    pub fn load(cli: &Cli) -> ConfigResult<ServerConfig> {
        Self::load_with(&SystemEnvProvider, cli)
    }

    pub fn load_with(env: &impl EnvProvider, cli: &Cli) -> ConfigResult<ServerConfig> {
        let settings = Self::apply_environment_overrides_with(env, Settings::default());
        let settings = Self::merge_with_cli(settings, cli);
        Self::resolve(env, &settings)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut settings: Settings,
    ) -> Settings {
        if let Some(address) = env.get(ENV_BIND_ADDRESS) {
            settings.bind_address = Some(address);
        }
        if let Some(tool) = env.get(ENV_EXIFTOOL) {
            settings.exiftool = Some(PathBuf::from(tool));
        }
        settings
    }

    /// Merge CLI arguments with settings (CLI takes precedence)
    pub fn merge_with_cli(mut settings: Settings, cli: &Cli) -> Settings {
        if let Some(address) = &cli.bind_address {
            settings.bind_address = Some(address.clone());
        }
        if let Some(tool) = &cli.exiftool {
            settings.exiftool = Some(tool.clone());
        }
        settings
    }

    /// Turn settings into a usable configuration, locating the tool
    pub fn resolve(env: &impl EnvProvider, settings: &Settings) -> ConfigResult<ServerConfig> {
        let bind_address = Self::parse_bind_address(
            settings
                .bind_address
                .as_deref()
                .unwrap_or(DEFAULT_BIND_ADDRESS),
        )?;
        let exiftool = Self::resolve_tool(env, settings.exiftool.as_deref())?;

        Ok(ServerConfig::new(bind_address, exiftool))
    }

    /// Parse `host:port`, resolving a host name once
    pub fn parse_bind_address(raw: &str) -> ConfigResult<SocketAddr> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            field: "bind_address".to_string(),
            value: raw.to_string(),
            reason,
        };

        raw.to_socket_addrs()
            .map_err(|err| invalid(err.to_string()))?
            .next()
            .ok_or_else(|| invalid("address resolved to nothing".to_string()))
    }

    /// Locate the tool.
    ///
    /// A value with a directory part must be an executable file. A bare name
    /// is searched in the `PATH` entries, in order.
    pub fn resolve_tool(env: &impl EnvProvider, requested: Option<&Path>) -> ConfigResult<PathBuf> {
        let requested = requested.unwrap_or(Path::new(DEFAULT_TOOL_NAME));

        if requested.is_absolute() || requested.components().count() > 1 {
            return if is_executable(requested) {
                Ok(requested.to_path_buf())
            } else {
                Err(ConfigError::ToolNotExecutable {
                    path: requested.to_path_buf(),
                })
            };
        }

        let search_path = env.get("PATH").unwrap_or_default();
        std::env::split_paths(&search_path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(requested))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| ConfigError::ToolNotFound {
                name: requested.display().to_string(),
            })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
