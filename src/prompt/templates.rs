//! 任务模板提供者
//!
//! lookup(task_name) 返回模板文本或 None；调用方把 None 转为 TemplateNotFound。
//! FileTemplateStore 从模板目录加载所有 *.json（名称 → 模板）与 *.toml（[templates] 表），
//! add 时把全部模板写回 prompts.json。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

/// 模板查询接口
pub trait TaskTemplateProvider: Send + Sync {
    fn lookup(&self, task_name: &str) -> Option<String>;
}

/// 内置默认模板
pub fn default_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        ("chat", "你是一个友好的助手，请根据提供的上下文信息回答问题。"),
        ("analysis", "你是一个数据分析师，请分析用户提供的数据。"),
        ("expert", "你是相关领域的专家，请提供专业的建议。"),
        (
            "analyzer",
            "你是一个问题分析专家。你的职责是：\n\
             1. 分析用户提出的问题的关键点\n\
             2. 提出解决问题需要考虑的各个方面\n\
             3. 与解决方案专家讨论，确保方案的可行性\n\
             请用简洁专业的语言进行沟通。",
        ),
        (
            "solver",
            "你是一个解决方案专家。你的职责是：\n\
             1. 根据问题分析专家的分析，提出具体的解决方案\n\
             2. 说明方案的可行性和潜在风险\n\
             3. 与问题分析专家讨论，优化解决方案\n\
             请用清晰条理的方式描述解决方案。",
        ),
    ]
}

/// 内存模板表
#[derive(Debug, Default)]
pub struct InMemoryTemplates {
    templates: RwLock<HashMap<String, String>>,
}

impl InMemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let store = Self::new();
        for (name, text) in default_templates() {
            store.add(name, text);
        }
        store
    }

    pub fn add(&self, task_name: impl Into<String>, template: impl Into<String>) {
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_name.into(), template.into());
    }

    pub fn remove(&self, task_name: &str) -> bool {
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_name)
            .is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TaskTemplateProvider for InMemoryTemplates {
    fn lookup(&self, task_name: &str) -> Option<String> {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_name)
            .cloned()
    }
}

#[derive(Deserialize)]
struct TomlTemplates {
    #[serde(default)]
    templates: HashMap<String, String>,
}

/// 目录持久化的模板存储
#[derive(Debug)]
pub struct FileTemplateStore {
    dir: PathBuf,
    inner: InMemoryTemplates,
}

impl FileTemplateStore {
    /// 加载目录下全部模板；目录不存在时创建
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create prompt dir {}", dir.display()))?;

        let inner = InMemoryTemplates::new();
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        for path in entries {
            let loaded = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => load_json(&path),
                Some("toml") => load_toml(&path),
                _ => continue,
            };
            match loaded {
                Ok(map) => {
                    for (name, text) in map {
                        inner.add(name, text);
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable template file"),
            }
        }

        info!(dir = %dir.display(), count = inner.names().len(), "Loaded task templates");
        Ok(Self { dir, inner })
    }

    /// 缺失的内置模板补齐（不覆盖已有同名模板）并落盘
    pub fn seed_defaults(&self) -> anyhow::Result<()> {
        let mut changed = false;
        for (name, text) in default_templates() {
            if self.inner.lookup(name).is_none() {
                self.inner.add(name, text);
                changed = true;
            }
        }
        if changed {
            self.save()?;
        }
        Ok(())
    }

    /// 新增或覆盖模板，并写回 prompts.json
    pub fn add(&self, task_name: impl Into<String>, template: impl Into<String>) -> anyhow::Result<()> {
        self.inner.add(task_name, template);
        self.save()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    fn save(&self) -> anyhow::Result<()> {
        let path = self.dir.join("prompts.json");
        let ordered: std::collections::BTreeMap<_, _> = self.inner.snapshot().into_iter().collect();
        std::fs::write(&path, serde_json::to_string_pretty(&ordered)?)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

impl TaskTemplateProvider for FileTemplateStore {
    fn lookup(&self, task_name: &str) -> Option<String> {
        self.inner.lookup(task_name)
    }
}

fn load_json(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn load_toml(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let data = std::fs::read_to_string(path)?;
    let parsed: TomlTemplates = toml::from_str(&data)?;
    Ok(parsed.templates)
}
