//! 群组与讨论记录
//!
//! Group 只保存成员 ID 与群聊历史，智能体本身由 ChatService 的注册表持有。
//! 群聊中某个成员失败只体现在它自己的回复上，不影响其他成员。

use serde::Serialize;

use crate::core::ChatError;

/// 单个成员对一条群消息的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReply {
    pub agent_id: String,
    pub outcome: Result<String, ChatError>,
}

impl GroupReply {
    /// 展示文本：成功为回复内容，失败为固定提示
    pub fn display_text(&self) -> &str {
        match &self.outcome {
            Ok(text) => text,
            Err(e) => e.user_message(),
        }
    }
}

/// 一条群聊记录：发送者、消息与各成员回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChatEntry {
    pub sender_id: String,
    pub message: String,
    pub replies: Vec<GroupReply>,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub name: String,
    members: Vec<String>,
    history: Vec<GroupChatEntry>,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            members: Vec::new(),
            history: Vec::new(),
        }
    }

    /// 加入成员，已在群中时返回 false
    pub fn add_member(&mut self, agent_id: impl Into<String>) -> bool {
        let agent_id = agent_id.into();
        if self.is_member(&agent_id) {
            return false;
        }
        self.members.push(agent_id);
        true
    }

    pub fn remove_member(&mut self, agent_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != agent_id);
        self.members.len() != before
    }

    pub fn is_member(&self, agent_id: &str) -> bool {
        self.members.iter().any(|m| m == agent_id)
    }

    /// 按加入顺序
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// 除发起者外的成员
    pub fn recipients(&self, initiator_id: &str) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| m.as_str() != initiator_id)
            .cloned()
            .collect()
    }

    pub fn record(&mut self, entry: GroupChatEntry) {
        self.history.push(entry);
    }

    pub fn history(&self) -> &[GroupChatEntry] {
        &self.history
    }

    /// 渲染最近 last_n 条群聊
    pub fn summarize_chat(&self, last_n: usize) -> String {
        let start = self.history.len().saturating_sub(last_n);
        let mut summary = format!("最近 {} 条群组对话总结:\n", last_n);
        for entry in &self.history[start..] {
            summary.push_str(&format!("\n发送者 {}: {}\n", entry.sender_id, entry.message));
            for reply in &entry.replies {
                summary.push_str(&format!(
                    "- {} 回复: {}\n",
                    reply.agent_id,
                    reply.display_text()
                ));
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionRole {
    Analyzer,
    Solver,
}

/// 讨论中的一次发言
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscussionStep {
    /// 从 1 开始
    pub round: usize,
    pub role: DiscussionRole,
    pub speaker_id: String,
    pub content: String,
}

/// 两个智能体围绕一个任务的完整讨论
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discussion {
    pub task: String,
    pub steps: Vec<DiscussionStep>,
    pub final_solution: String,
}

impl Discussion {
    /// 渲染为可读文本
    pub fn transcript(&self) -> String {
        let mut out = format!("讨论任务: {}\n", self.task);
        for step in &self.steps {
            let speaker = match step.role {
                DiscussionRole::Analyzer => "分析专家",
                DiscussionRole::Solver => "方案专家",
            };
            out.push_str(&format!("\n[第{}轮] {}：{}\n", step.round, speaker, step.content));
        }
        out
    }
}
