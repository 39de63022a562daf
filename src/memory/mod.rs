//! 记忆层：智能体对话记忆、导出持久化、知识检索

pub mod conversation;
pub mod knowledge;
pub mod persistence;
pub mod tokenizer;

pub use conversation::{AgentMemory, MemoryTurn, Message, Role};
pub use knowledge::{InMemoryKnowledgeBase, NoopRetrieval, RetrievalProvider};
pub use persistence::MemoryPersistence;
