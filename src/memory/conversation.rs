//! 智能体记忆：对话轮次
//!
//! AgentMemory 只追加、不淘汰：完整历史保留供导出审计，
//! 但 window(k) 只返回最近 k 轮（从旧到新），保证组装出的 Prompt 大小稳定。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 一轮已完成的对话：用户输入与智能体输出
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTurn {
    pub user_input: String,
    pub agent_output: String,
    /// 追加时间（毫秒时间戳）
    #[serde(default)]
    pub recorded_at: i64,
}

impl MemoryTurn {
    pub fn new(user_input: impl Into<String>, agent_output: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            agent_output: agent_output.into(),
            recorded_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 单个智能体独占的对话记忆
#[derive(Clone, Debug, Default)]
pub struct AgentMemory {
    turns: Vec<MemoryTurn>,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有历史恢复（如导入导出文件）
    pub fn from_turns(turns: Vec<MemoryTurn>) -> Self {
        Self { turns }
    }

    /// 唯一的修改入口：任务结果确定之后才调用
    pub fn append(&mut self, turn: MemoryTurn) {
        self.turns.push(turn);
    }

    /// 最近 min(k, len) 轮，从旧到新
    pub fn window(&self, k: usize) -> &[MemoryTurn] {
        let start = self.turns.len().saturating_sub(k);
        &self.turns[start..]
    }

    /// 完整历史（导出用）
    pub fn all(&self) -> &[MemoryTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
