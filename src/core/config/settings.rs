use std::path::PathBuf;
use std::time::Duration;

use super::parsing::{
    env_model, env_optional, env_or_default, normalize_base_url, parse_bool, parse_cors_origins,
    parse_environment, parse_u16, parse_u64,
};
use super::types::{
    ConfigError, CorsSettings, LauncherSettings, NimSettings, RuntimeSettings, ServerHost,
    ServerPort, ServerSettings, Settings, TelemetrySettings, UploadSettings,
};

const DEFAULT_NIM_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
const DEFAULT_CHAT_MODEL: &str = "qwen/qwen3-next-80b-a3b-instruct";
const DEFAULT_EMBED_MODEL: &str = "nv-embedqa-e5-v5";
const LAUNCHER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADER_BACKEND_HOST", "0.0.0.0");
        let port = env_or_default("GRADER_BACKEND_PORT", "8000");

        let environment = parse_environment(env_optional("GRADER_ENV"));
        let strict_config =
            env_optional("GRADER_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let cors_origins = parse_cors_origins(env_optional("GRADER_CORS_ORIGINS"))?;

        let base_url = normalize_base_url(env_or_default("NIM_BASE_URL", DEFAULT_NIM_BASE_URL));
        let api_key = env_or_default("NIM_API_KEY", "");
        let chat_model = env_model("NIM_CHAT_MODEL", DEFAULT_CHAT_MODEL);
        let embed_model = env_model("NIM_EMBED_MODEL", DEFAULT_EMBED_MODEL);

        let max_upload_size_mb = parse_u64(
            "GRADER_MAX_UPLOAD_SIZE_MB",
            env_or_default("GRADER_MAX_UPLOAD_SIZE_MB", "20"),
        )?;

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            cors: CorsSettings { origins: cors_origins },
            nim: NimSettings { base_url, api_key, chat_model, embed_model },
            upload: UploadSettings { max_upload_size_mb },
            telemetry: load_telemetry(),
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn nim(&self) -> &NimSettings {
        &self.nim
    }

    pub(crate) fn upload(&self) -> &UploadSettings {
        &self.upload
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nim.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "NIM_BASE_URL",
                value: String::from("<empty>"),
            });
        }

        if self.upload.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_MAX_UPLOAD_SIZE_MB",
                value: String::from("0"),
            });
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if self.nim.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("NIM_API_KEY"));
        }

        Ok(())
    }
}

impl LauncherSettings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let backend_host = ServerHost::parse(env_or_default("GRADER_BACKEND_HOST", "0.0.0.0"))?;
        let backend_port = ServerPort::parse(env_or_default("GRADER_BACKEND_PORT", "8000"))?;
        let backend_reload = parse_bool(&env_or_default("GRADER_BACKEND_RELOAD", "true"));
        let frontend_port = parse_u16(
            "GRADER_FRONTEND_PORT",
            env_or_default("GRADER_FRONTEND_PORT", "3000"),
        )?;
        let frontend_dir =
            PathBuf::from(env_or_default("GRADER_FRONTEND_DIR", "grader_frontend"));

        Ok(Self {
            backend_host: backend_host.0,
            backend_port: backend_port.0,
            backend_reload,
            frontend_port,
            frontend_dir,
            shutdown_grace: LAUNCHER_SHUTDOWN_GRACE,
            telemetry: load_telemetry(),
        })
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}

fn load_telemetry() -> TelemetrySettings {
    let log_level = env_or_default("GRADER_LOG_LEVEL", "info");
    let json = env_optional("GRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
    let prometheus_enabled =
        env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);
    TelemetrySettings { log_level, json, prometheus_enabled }
}
