//! 记忆持久化
//!
//! 将智能体完整对话历史写入/从 JSON 文件加载，用于导出审计或跨进程恢复（可选使用）。

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::memory::{AgentMemory, MemoryTurn};

/// 单文件 JSON 持久化：包含智能体 ID 与全部轮次
#[derive(Debug)]
pub struct MemoryPersistence {
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct MemoryFile {
    agent_id: String,
    turns: Vec<MemoryTurn>,
}

impl MemoryPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 默认路径：<memory_dir>/<agent_id>.json
    pub fn for_agent(memory_dir: &Path, agent_id: &str) -> Self {
        Self::new(memory_dir.join(format!("{agent_id}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 从 JSON 文件加载；文件不存在时返回空记忆
    pub fn load(&self) -> anyhow::Result<AgentMemory> {
        if !self.path.exists() {
            return Ok(AgentMemory::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let file: MemoryFile = serde_json::from_str(&data)
            .with_context(|| format!("parse {}", self.path.display()))?;
        Ok(AgentMemory::from_turns(file.turns))
    }

    /// 写入 JSON 文件；父目录不存在时自动创建
    pub fn save(&self, agent_id: &str, memory: &AgentMemory) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = MemoryFile {
            agent_id: agent_id.to_string(),
            turns: memory.all().to_vec(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}
