//! Prompt 层：任务模板与上下文组装

pub mod assembler;
pub mod templates;

pub use assembler::{AssembledPrompt, PromptAssembler};
pub use templates::{default_templates, FileTemplateStore, InMemoryTemplates, TaskTemplateProvider};
