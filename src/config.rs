//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__DISPATCH__WORKERS=8`）。
//! 每个字段都有默认值，缺少配置文件时也能得到可运行的配置。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::PollConfig;
use crate::llm::{ModelParameters, RetryPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub dispatch: DispatchSection,
    pub memory: MemorySection,
    pub retrieval: RetrievalSection,
}

/// [app] 段：应用名、模板目录、记忆导出目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub prompt_dir: PathBuf,
    pub memory_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            prompt_dir: PathBuf::from("config/prompts"),
            memory_dir: PathBuf::from("memory"),
        }
    }
}

/// [llm] 段：后端选择与默认模型参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / http / mock
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub base_url: Option<String>,
    /// 未设置时按 provider 读取 OPENAI_API_KEY / DEEPSEEK_API_KEY
    pub api_key: Option<String>,
    pub http: LlmHttpSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        let params = ModelParameters::default();
        Self {
            provider: "mock".to_string(),
            model: params.model,
            temperature: params.temperature,
            base_url: None,
            api_key: None,
            http: LlmHttpSection::default(),
        }
    }
}

impl LlmSection {
    pub fn model_parameters(&self) -> ModelParameters {
        ModelParameters::new(self.model.clone(), self.temperature)
    }
}

/// [llm.http] 段：通用 HTTP 端点
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmHttpSection {
    pub endpoint: Option<String>,
}

/// [dispatch] 段：工作者数 N、重试次数 R、单次超时 T、轮询参数、结果过期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub workers: usize,
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_interval_ms: u64,
    /// 未取走结果的保留时间；None 表示不清理
    pub result_ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            attempt_timeout_secs: 20,
            retry_delay_ms: 500,
            poll_max_attempts: 900,
            poll_interval_ms: 100,
            result_ttl_secs: None,
            sweep_interval_secs: 30,
        }
    }
}

impl DispatchSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.attempt_timeout_secs))
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(
            self.poll_max_attempts,
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn result_ttl(&self) -> Option<Duration> {
        self.result_ttl_secs.map(Duration::from_secs)
    }
}

/// [memory] 段：组装 Prompt 时可见的最近轮数 k
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub window: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self { window: 5 }
    }
}

/// [retrieval] 段：知识检索
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub enabled: bool,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: 3,
            chunk_size: 1000,
            chunk_overlap: 200,
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

    builder.build()?.try_deserialize()
}
