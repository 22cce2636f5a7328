use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use renderq_backend::sdapi::DEFAULT_API_URL;
use renderq_core::params::RenderDefaults;
use renderq_core::types::{DbId, Origin};
use renderq_queue::QueueConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a WebUI running on the same host.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Base URL of the WebUI API.
    pub sd_api_url: String,
    /// WebUI launch script. `None` disables the process supervisor.
    pub sd_webui_path: Option<PathBuf>,
    /// Whether an unreachable WebUI may be (re)started.
    pub sd_start: bool,
    /// Skip the eager WebUI start at boot; start on first need instead.
    pub delayed_sd_start: bool,
    pub max_job_duration_secs: u64,
    pub input_timeout_secs: u64,
    /// Where uploaded images are written and served from.
    pub output_dir: PathBuf,
    pub render_defaults: RenderDefaults,
    /// Who may submit requests.
    pub access: AccessList,
    /// GPU status command behind `/backend/smi` (default: `nvidia-smi`).
    pub smi_command: String,
}

/// Requesters allowed to use the server.
///
/// Empty lists admit nobody. Admins are always allowed in direct chats and
/// are greeted when the server starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    pub user_ids: Vec<DbId>,
    pub group_ids: Vec<DbId>,
    pub admin_user_ids: Vec<DbId>,
}

impl AccessList {
    /// Group requests are judged by the group, direct ones by the user.
    pub fn allows(&self, origin: &Origin) -> bool {
        if origin.is_group() {
            self.group_ids.contains(&origin.chat_id)
        } else {
            self.user_ids.contains(&origin.requester_id)
                || self.admin_user_ids.contains(&origin.requester_id)
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                            |
    /// |--------------------------|------------------------------------|
    /// | `HOST`                   | `0.0.0.0`                          |
    /// | `PORT`                   | `3000`                             |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`            |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                               |
    /// | `SD_API_URL`             | `http://localhost:7860/sdapi/v1`   |
    /// | `SD_WEBUI_PATH`          | (none)                             |
    /// | `SD_START`               | `1`                                |
    /// | `DELAYED_SD_START`       | `0`                                |
    /// | `MAX_JOB_DURATION_SECS`  | `600`                              |
    /// | `INPUT_TIMEOUT_SECS`     | `180`                              |
    /// | `OUTPUT_DIR`             | `./outputs`                        |
    /// | `DEFAULT_MODEL`          | (empty, backend default)           |
    /// | `DEFAULT_SAMPLER`        | (empty, backend default)           |
    /// | `DEFAULT_WIDTH`          | `512`                              |
    /// | `DEFAULT_HEIGHT`         | `512`                              |
    /// | `DEFAULT_WIDTH_SDXL`     | `1024`                             |
    /// | `DEFAULT_HEIGHT_SDXL`    | `1024`                             |
    /// | `ALLOWED_USER_IDS`       | (empty, comma-separated ids)       |
    /// | `ALLOWED_GROUP_IDS`      | (empty, comma-separated ids)       |
    /// | `ADMIN_USER_IDS`         | (empty, comma-separated ids)       |
    /// | `SMI_COMMAND`            | `nvidia-smi`                       |
    ///
    /// Panics on malformed numeric values or ids so misconfiguration fails
    /// fast.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let cors_origins = var("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let sd_webui_path = lookup("SD_WEBUI_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let render_defaults = RenderDefaults {
            model: var("DEFAULT_MODEL", ""),
            sampler: var("DEFAULT_SAMPLER", ""),
            width: parse(&lookup, "DEFAULT_WIDTH", 512),
            height: parse(&lookup, "DEFAULT_HEIGHT", 512),
            width_sdxl: parse(&lookup, "DEFAULT_WIDTH_SDXL", 1024),
            height_sdxl: parse(&lookup, "DEFAULT_HEIGHT_SDXL", 1024),
        };

        let access = AccessList {
            user_ids: id_list(&lookup, "ALLOWED_USER_IDS"),
            group_ids: id_list(&lookup, "ALLOWED_GROUP_IDS"),
            admin_user_ids: id_list(&lookup, "ADMIN_USER_IDS"),
        };

        Self {
            host: var("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 3000),
            cors_origins,
            request_timeout_secs: parse(&lookup, "REQUEST_TIMEOUT_SECS", 30),
            sd_api_url: var("SD_API_URL", DEFAULT_API_URL),
            sd_webui_path,
            sd_start: flag(&lookup, "SD_START", true),
            delayed_sd_start: flag(&lookup, "DELAYED_SD_START", false),
            max_job_duration_secs: parse(&lookup, "MAX_JOB_DURATION_SECS", 600),
            input_timeout_secs: parse(&lookup, "INPUT_TIMEOUT_SECS", 180),
            output_dir: PathBuf::from(var("OUTPUT_DIR", "./outputs")),
            render_defaults,
            access,
            smi_command: var("SMI_COMMAND", "nvidia-smi"),
        }
    }

    /// Whether an unreachable WebUI gets (re)started by this process.
    pub fn supervisor_enabled(&self) -> bool {
        self.sd_start && self.sd_webui_path.is_some()
    }

    /// Queue timing: the two limits come from the environment, display and
    /// poll rates keep their defaults.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_job_duration: Duration::from_secs(self.max_job_duration_secs),
            input_timeout: Duration::from_secs(self.input_timeout_secs),
            ..QueueConfig::default()
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number: {e}")),
        None => default,
    }
}

/// Comma-separated ids; blank entries are skipped.
fn id_list(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Vec<DbId> {
    lookup(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .unwrap_or_else(|_| panic!("{key} contains an invalid id: {s}"))
        })
        .collect()
}

/// `1`/`true`/`yes` (any case) enable, anything else disables.
fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key) {
        Some(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        None => default,
    }
}
