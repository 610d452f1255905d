//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__SERVER__PORT=9000`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::tools::ClientToolRegistry;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// [app] 段：应用名、模型名（写入每个流块）
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_app_name() -> String {
    "hive".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            model: default_model(),
        }
    }
}

/// [server] 段：监听地址与 SSE 心跳间隔
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SSE 心跳注释的发送间隔（秒），0 表示不发送
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_keepalive_secs() -> u64 {
    15
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

/// [tools] 段：在客户端执行的工具名
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_client_tools")]
    pub client_tools: Vec<String>,
}

fn default_client_tools() -> Vec<String> {
    vec!["export_csv".into()]
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            client_tools: default_client_tools(),
        }
    }
}

impl ToolsSection {
    pub fn client_tool_registry(&self) -> ClientToolRegistry {
        self.client_tools.iter().cloned().collect()
    }
}

/// [store] 段：Run 存储后端
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

fn default_store_backend() -> String {
    "memory".to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
