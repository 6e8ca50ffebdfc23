//! Runtime configuration, loaded from the environment.
//!
//! `.env` is loaded first (when present), then each section reads its
//! variables with defaulting helpers. Durations are given in seconds.

use std::time::Duration;

/// Git transport used to build clone URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitProtocol {
    Ssh,
    Https,
}

impl GitProtocol {
    fn parse(value: &str) -> Self {
        match value {
            "ssh" => GitProtocol::Ssh,
            _ => GitProtocol::Https,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base path all routes are nested under.
    pub path: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Bound on the replay phase of a new subscription; zero disables it.
    pub handshake_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
}

impl RedisConfig {
    /// Connection URL in the form `redis://[:password@]addr/db`.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct GitConfig {
    pub host: String,
    pub user_name: String,
    pub token: String,
    pub project: String,
    pub protocol: GitProtocol,
}

impl GitConfig {
    /// The URL `git clone` uses for a repository.
    pub fn remote_url(&self, repository: &str) -> String {
        let repository = self.repository_path(repository);
        match self.protocol {
            GitProtocol::Ssh => format!("git@{}:{}.git", self.host, repository),
            GitProtocol::Https => format!("https://{}/{}.git", self.host, repository),
        }
    }

    /// The `project/repository` slug used by the git host API.
    pub fn repository_path(&self, repository: &str) -> String {
        if self.project.is_empty() {
            repository.to_string()
        } else {
            format!("{}/{}", self.project, repository)
        }
    }

    /// The browsable URL of a repository.
    pub fn repository_url(&self, repository: &str) -> String {
        format!("https://{}/{}", self.host, self.repository_path(repository))
    }
}

#[derive(Debug, Clone)]
pub struct WikiConfig {
    pub base_url: String,
    pub user_name: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct SecretStoreConfig {
    pub base_url: String,
    pub user_name: String,
    pub token: String,
}

/// Paths, repositories, and branches driving one setup workflow. Every
/// destination dir carries a `{{process-id}}` placeholder substituted at
/// workflow start.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub root_destinations_path: String,
    pub templates_repository: String,
    pub templates_repository_branch: String,
    pub templates_destination_dir: String,
    pub git_ops_repository: String,
    pub git_ops_repository_branch: String,
    pub git_ops_destination_dir: String,
    pub git_ops_tools_repository: String,
    pub git_ops_tools_repository_branch: String,
    pub git_ops_tools_destination_dir: String,
    pub default_image_name: String,
    pub default_image_tag: String,
    pub external_config_map: bool,
    pub config_map_repository: String,
    pub config_map_repository_branch: String,
    pub config_map_destination_dir: String,
    pub application_main_branch: String,
    pub application_destination_dir: String,
    /// Remove the process root directory in finish-setup. Off by default.
    pub cleanup_on_finish: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub http: HttpConfig,
    pub websocket: WsConfig,
    pub redis: RedisConfig,
    pub cors: CorsConfig,
    pub setup: SetupConfig,
    pub git: GitConfig,
    pub wiki: WikiConfig,
    pub secret: SecretStoreConfig,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            log_level: env_or("LOGLEVEL", "error"),
            http: HttpConfig {
                path: env_or("HTTP_PATH", "api"),
                port: env_parse_or("HTTP_PORT", 8080),
            },
            websocket: WsConfig {
                read_buffer_size: env_parse_or("WEBSOCKET_READBUFFERSIZE", 1024),
                write_buffer_size: env_parse_or("WEBSOCKET_WRITEBUFFERSIZE", 1024),
                handshake_timeout: Duration::from_secs(env_parse_or(
                    "WEBSOCKET_HANDSHAKETIMEOUT",
                    0u64,
                )),
            },
            redis: RedisConfig {
                addr: env_or("REDIS_ADDR", "localhost:6379"),
                password: env_or("REDIS_PASSWORD", ""),
                db: env_parse_or("REDIS_DB", 0),
            },
            cors: CorsConfig {
                allowed_origins: env_list_or("CORS_ALLOWEDORIGINS", "http://localhost:3000"),
                allowed_methods: env_list_or("CORS_ALLOWEDMETHODS", "*"),
                allow_headers: env_list_or("CORS_ALLOWHEADERS", "*"),
                expose_headers: env_list_or("CORS_EXPOSEHEADERS", "Content-Length"),
                allow_credentials: env_bool("CORS_ALLOWCREDENTIALS"),
                max_age: Duration::from_secs(env_parse_or("CORS_MAXAGE", 43_200u64)),
            },
            setup: SetupConfig {
                root_destinations_path: env_or(
                    "SETUPCICD_ROOTDESTINATIONSPATH",
                    "/tmp/setup-ci-cd/{{process-id}}",
                ),
                templates_repository: env_or("SETUPCICD_TEMPLATESREPOSITORY", "devportal-templates"),
                templates_repository_branch: env_or("SETUPCICD_TEMPLATESREPOSITORYBRANCH", "develop"),
                templates_destination_dir: env_or(
                    "SETUPCICD_TEMPLATESDESTINATIONDIR",
                    "/tmp/setup-ci-cd/{{process-id}}/templates",
                ),
                git_ops_repository: env_or("SETUPCICD_GITOPSREPOSITORY", "git-ops"),
                git_ops_repository_branch: env_or("SETUPCICD_GITOPSREPOSITORYBRANCH", "develop"),
                git_ops_destination_dir: env_or(
                    "SETUPCICD_GITOPSDESTINATIONDIR",
                    "/tmp/setup-ci-cd/{{process-id}}/git-ops",
                ),
                git_ops_tools_repository: env_or("SETUPCICD_GITOPSTOOLSREPOSITORY", "git-ops-tools"),
                git_ops_tools_repository_branch: env_or(
                    "SETUPCICD_GITOPSTOOLSREPOSITORYBRANCH",
                    "develop",
                ),
                git_ops_tools_destination_dir: env_or(
                    "SETUPCICD_GITOPSTOOLSDESTINATIONDIR",
                    "/tmp/setup-ci-cd/{{process-id}}/git-ops-tools",
                ),
                default_image_name: env_or("SETUPCICD_DEFAULTIMAGENAME", "tempocloud/template-api"),
                default_image_tag: env_or("SETUPCICD_DEFAULTIMAGETAG", "latest"),
                external_config_map: env_bool("SETUPCICD_EXTERNALCONFIGMAP"),
                config_map_repository: env_or("SETUPCICD_CONFIGMAPREPOSITORY", "config-maps"),
                config_map_repository_branch: env_or("SETUPCICD_CONFIGMAPREPOSITORYBRANCH", "develop"),
                config_map_destination_dir: env_or(
                    "SETUPCICD_CONFIGMAPDESTINATIONDIR",
                    "/tmp/setup-ci-cd/{{process-id}}/config-maps",
                ),
                application_main_branch: env_or("SETUPCICD_APPLICATIONMAINBRANCH", "master"),
                application_destination_dir: env_or(
                    "SETUPCICD_APPLICATIONDESTINATIONDIR",
                    "/tmp/setup-ci-cd/{{process-id}}/application",
                ),
                cleanup_on_finish: env_bool("SETUPCICD_CLEANUPONFINISH"),
            },
            git: GitConfig {
                host: env_or("GITCONFIG_HOST", ""),
                user_name: env_or("GITCONFIG_USERNAME", ""),
                token: env_or("GITCONFIG_TOKEN", ""),
                project: env_or("GITCONFIG_PROJECT", ""),
                protocol: match std::env::var("GITCONFIG_PROTOCOL") {
                    Ok(value) if !value.is_empty() => GitProtocol::parse(&value),
                    _ => GitProtocol::Ssh,
                },
            },
            wiki: WikiConfig {
                base_url: env_or("WIKICONFIG_BASEURL", ""),
                user_name: env_or("WIKICONFIG_USERNAME", ""),
                token: env_or("WIKICONFIG_TOKEN", ""),
            },
            secret: SecretStoreConfig {
                base_url: env_or("SECRETCONFIG_BASEURL", ""),
                user_name: env_or("SECRETCONFIG_USERNAME", ""),
                token: env_or("SECRETCONFIG_TOKEN", ""),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_parse_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| v == "true")
}

fn env_list_or(key: &str, default: &str) -> Vec<String> {
    env_or(key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
