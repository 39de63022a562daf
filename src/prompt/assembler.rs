//! Prompt 组装（纯函数）
//!
//! userMessage 的顺序固定为：
//! 1. 任务模板
//! 2. 历史对话记录（记忆窗口，从旧到新，按 1..k 编号）
//! 3. 相关参考信息（检索片段，换行连接）
//! 4. 当前用户的输入
//!
//! 各块之间以单个换行分隔；缺失的块不产生任何文本。
//! systemMessage 仅在智能体设置了人设时非空。

use crate::memory::MemoryTurn;

pub const MEMORY_HEADER: &str = "历史对话记录：";
pub const CONTEXT_HEADER: &str = "相关参考信息：";
pub const INPUT_LABEL: &str = "当前用户的输入为：";

/// 组装结果，每次调用新建
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub system_message: String,
    pub user_message: String,
}

/// 渲染单轮记忆：序号从 1 开始
fn render_turn(index: usize, turn: &MemoryTurn) -> String {
    format!(
        "历史记录 {}:\n输入: {}\n输出: {}",
        index, turn.user_input, turn.agent_output
    )
}

pub struct PromptAssembler;

impl PromptAssembler {
    /// 组装 Prompt。memory 须为已截断的窗口（从旧到新）；
    /// context 中的空白片段会被忽略，全部为空时视同无参考信息。
    pub fn assemble(
        task_template: &str,
        memory: &[MemoryTurn],
        context: Option<&[String]>,
        new_input: &str,
        persona: Option<&str>,
    ) -> AssembledPrompt {
        let mut blocks: Vec<String> = vec![task_template.to_string()];

        if !memory.is_empty() {
            let turns: Vec<String> = memory
                .iter()
                .enumerate()
                .map(|(i, t)| render_turn(i + 1, t))
                .collect();
            blocks.push(format!("{}\n{}", MEMORY_HEADER, turns.join("\n")));
        }

        let snippets: Vec<&str> = context
            .unwrap_or_default()
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !snippets.is_empty() {
            blocks.push(format!("{}\n{}", CONTEXT_HEADER, snippets.join("\n")));
        }

        blocks.push(format!("{}{}", INPUT_LABEL, new_input));

        AssembledPrompt {
            system_message: persona.unwrap_or_default().to_string(),
            user_message: blocks.join("\n"),
        }
    }
}
