use anyhow::{Context, Result, anyhow};
use std::{
    env,
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use crate::engine::sandbox::{LanguageRegistry, RuntimeDescriptor};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub execution: ExecutionConfig,
    pub admission: AdmissionConfig,
    pub max_body_bytes: usize,
    pub persistence_path: Option<PathBuf>,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub default_timeout: Duration,
    pub max_code_bytes: usize,
    pub max_output_bytes: usize,
    pub workspace_root: PathBuf,
    pub node_path: Option<PathBuf>,
    pub language_overrides: Vec<LanguageOverride>,
}

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub max_concurrent: usize,
    pub max_queued: usize,
    pub max_wait: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageOverride {
    pub language: String,
    pub descriptor: RuntimeDescriptor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" | "text" => Ok(Self::Compact),
            _ => Err(format!("unsupported log format: {s}")),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        let default_timeout =
            Duration::from_millis(parse_env(&lookup, "DEFAULT_TIMEOUT_MS", 10_000u64).max(1));

        let execution = ExecutionConfig {
            default_timeout,
            max_code_bytes: parse_env(&lookup, "MAX_CODE_BYTES", 250_000usize),
            max_output_bytes: parse_env(&lookup, "MAX_OUTPUT_BYTES", 64 * 1024usize).max(1),
            workspace_root: lookup("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            node_path: lookup("NODE_PATH_DIR").map(PathBuf::from).or_else(|| {
                env::current_dir()
                    .ok()
                    .map(|cwd| cwd.join("node_modules"))
            }),
            language_overrides: parse_languages(
                &lookup("LANGUAGES").unwrap_or_default(),
                default_timeout,
            )?,
        };

        let admission = AdmissionConfig {
            max_concurrent: parse_env(&lookup, "MAX_CONCURRENT_EXECUTIONS", default_parallelism())
                .max(1),
            max_queued: parse_env(&lookup, "MAX_QUEUED_EXECUTIONS", 64usize),
            max_wait: Duration::from_millis(parse_env(&lookup, "ADMISSION_WAIT_MS", 30_000u64)),
        };

        Ok(Self {
            bind_addr,
            execution,
            admission,
            max_body_bytes: parse_env(&lookup, "MAX_BODY_BYTES", 1_048_576usize),
            persistence_path: lookup("PERSIST_RESULTS_PATH").map(PathBuf::from),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_env(&lookup, "LOG_FORMAT", LogFormat::Json),
        })
    }
}

impl ExecutionConfig {
    pub fn registry(&self) -> LanguageRegistry {
        self.language_overrides.iter().fold(
            LanguageRegistry::builtin(self.default_timeout, self.node_path.as_deref()),
            |registry, entry| registry.with(&entry.language, entry.descriptor.clone()),
        )
    }
}

/// Parses `id=.ext@command args[@timeout_ms]` entries separated by commas.
fn parse_languages(raw: &str, default_timeout: Duration) -> Result<Vec<LanguageOverride>> {
    let mut out = Vec::new();
    for chunk in raw.split(',').filter(|c| !c.trim().is_empty()) {
        let mut parts = chunk.splitn(2, '=');
        let language = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("invalid language entry: {chunk}"))?
            .to_string();
        let rhs = parts
            .next()
            .map(str::trim)
            .ok_or_else(|| anyhow!("invalid language entry: {chunk}"))?;

        let fields: Vec<&str> = rhs.split('@').map(str::trim).collect();
        let extension = fields
            .first()
            .filter(|s| s.starts_with('.') && s.len() > 1)
            .ok_or_else(|| anyhow!("invalid file extension for {language}"))?;
        let command = fields
            .get(1)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("missing command for {language}"))?;
        let timeout = fields
            .get(2)
            .map(|s| s.parse::<u64>().context("invalid language timeout"))
            .transpose()?
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or(default_timeout);

        out.push(LanguageOverride {
            descriptor: RuntimeDescriptor::new(extension, command, timeout),
            language,
        });
    }
    Ok(out)
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
