//! Hive - 多智能体对话编排
//!
//! 模块划分：
//! - **agent**: 智能体运行时（组装 Prompt、提交、轮询、写回记忆）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 调用方可见的错误分类
//! - **dispatch**: 请求分发、工作者池、结果存储与轮询
//! - **group**: 群组、群聊历史与讨论记录
//! - **llm**: 补全后端抽象、重试策略与实现（OpenAI 兼容 / DeepSeek / HTTP / Mock）
//! - **memory**: 对话记忆、持久化与知识检索
//! - **prompt**: 任务模板与 Prompt 组装
//! - **service**: 对外服务（智能体 / 群组注册表与生命周期）

pub mod agent;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod group;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompt;
pub mod service;

pub use agent::{Agent, AgentComponents};
pub use crate::core::ChatError;
pub use service::{ChatService, ChatServiceBuilder, DEFAULT_GROUP_ID};
