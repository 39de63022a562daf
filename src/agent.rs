//! 智能体运行时
//!
//! AgentComponents 是所有智能体共享的协作者（分发器、轮询客户端、模板、检索），
//! Agent 独占自己的对话记忆。process_task 走完一轮：
//! 组装 Prompt → Dispatcher::submit → PollingClient::wait → 成功时追加记忆 → 返回文本。
//! 记忆只在拿到 Success 之后追加，失败与超时不会留下半截轮次。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::ChatError;
use crate::dispatch::{CompletionResult, Dispatcher, Outcome, PollingClient};
use crate::llm::ModelParameters;
use crate::memory::{AgentMemory, MemoryTurn, RetrievalProvider};
use crate::prompt::{AssembledPrompt, PromptAssembler, TaskTemplateProvider};

/// 共享组件：可被任意多个智能体同时使用
#[derive(Clone)]
pub struct AgentComponents {
    pub dispatcher: Dispatcher,
    pub poller: PollingClient,
    pub templates: Arc<dyn TaskTemplateProvider>,
    /// 未启用检索时为 None，Prompt 中不出现参考信息块
    pub retrieval: Option<Arc<dyn RetrievalProvider>>,
    /// 记忆窗口 k
    pub memory_window: usize,
    pub top_k: usize,
}

/// 单个智能体：身份、人设、模型参数与独占的记忆
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// 非空时作为 system 消息
    pub persona: Option<String>,
    pub params: ModelParameters,
    memory: AgentMemory,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        persona: Option<String>,
        params: ModelParameters,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            persona: persona.filter(|p| !p.trim().is_empty()),
            params,
            memory: AgentMemory::new(),
        }
    }

    pub fn memory(&self) -> &AgentMemory {
        &self.memory
    }

    /// 整体替换记忆（导入时使用）
    pub fn replace_memory(&mut self, memory: AgentMemory) {
        self.memory = memory;
    }

    /// 组装本轮 Prompt；模板不存在时返回 TemplateNotFound
    pub async fn build_prompt(
        &self,
        components: &AgentComponents,
        task_name: &str,
        input: &str,
    ) -> Result<AssembledPrompt, ChatError> {
        let template = components
            .templates
            .lookup(task_name)
            .ok_or_else(|| ChatError::TemplateNotFound(task_name.to_string()))?;

        let snippets = match &components.retrieval {
            Some(retrieval) => retrieval.relevant_snippets(input, components.top_k).await,
            None => Vec::new(),
        };

        Ok(PromptAssembler::assemble(
            &template,
            self.memory.window(components.memory_window),
            Some(snippets.as_slice()),
            input,
            self.persona.as_deref(),
        ))
    }

    /// 处理一轮任务并返回回复文本
    pub async fn process_task(
        &mut self,
        components: &AgentComponents,
        task_name: &str,
        input: &str,
    ) -> Result<String, ChatError> {
        let prompt = self.build_prompt(components, task_name, input).await?;
        let correlation_id = components.dispatcher.submit(
            &self.id,
            prompt.system_message,
            prompt.user_message,
            self.params.clone(),
        )?;
        debug!(agent_id = %self.id, task_name, correlation_id = %correlation_id, "Task submitted");

        let result = components.poller.wait(&correlation_id).await;
        self.settle(components, input, result)
    }

    /// 不经过后端，以预置文本完成一轮（仍走存储与轮询，记忆照常追加）
    pub async fn reply_canned(
        &mut self,
        components: &AgentComponents,
        input: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        let correlation_id = components.dispatcher.submit_canned(&self.id, text);
        let result = components.poller.wait(&correlation_id).await;
        self.settle(components, input, result)
    }

    fn settle(
        &mut self,
        components: &AgentComponents,
        input: &str,
        result: CompletionResult,
    ) -> Result<String, ChatError> {
        match result.outcome {
            Outcome::Success(text) => {
                self.memory.append(MemoryTurn::new(input, text.clone()));
                Ok(text)
            }
            Outcome::BackendFailure(detail) => {
                warn!(agent_id = %self.id, attempts = result.attempts, "Task failed");
                Err(ChatError::BackendFailure(detail))
            }
            Outcome::Timeout => Err(ChatError::Timeout {
                correlation_id: result.correlation_id.to_string(),
                waited_ms: components.poller.config().budget().as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{CannedProcessor, PollConfig, ResponseStore, WorkerPool};
    use crate::llm::mock::{FailingBackend, RecordingBackend, StallingBackend};
    use crate::llm::{CompletionBackend, RetryPolicy};
    use crate::memory::InMemoryKnowledgeBase;
    use crate::prompt::InMemoryTemplates;
    use std::time::Duration;

    fn components_with(
        backend: Arc<dyn CompletionBackend>,
        policy: RetryPolicy,
        poll: PollConfig,
    ) -> (AgentComponents, WorkerPool) {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::with_backend(2, rx, Arc::clone(&store), backend, policy);
        let components = AgentComponents {
            dispatcher,
            poller: PollingClient::new(store, poll),
            templates: Arc::new(InMemoryTemplates::with_defaults()),
            retrieval: None,
            memory_window: 3,
            top_k: 2,
        };
        (components, pool)
    }

    fn agent() -> Agent {
        Agent::new("1", "通用助手", None, ModelParameters::default())
    }

    #[tokio::test]
    async fn test_unknown_template_fails_fast_without_dispatch() {
        let backend = Arc::new(RecordingBackend::new("x"));
        let (components, pool) = components_with(
            backend.clone(),
            RetryPolicy::default(),
            PollConfig::default(),
        );
        let mut agent = agent();

        let err = agent
            .process_task(&components, "no-such-task", "hi")
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::TemplateNotFound("no-such-task".into()));
        assert_eq!(err.user_message(), "未找到对应任务的prompt");
        assert_eq!(components.dispatcher.submitted(), 0);
        assert!(agent.memory().is_empty());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_success_appends_exactly_one_turn() {
        let backend = Arc::new(RecordingBackend::new("晴天"));
        let (components, pool) = components_with(
            backend.clone(),
            RetryPolicy::default(),
            PollConfig::new(100, Duration::from_millis(10)),
        );
        let mut agent = agent();

        let reply = agent
            .process_task(&components, "chat", "北京天气怎么样")
            .await
            .unwrap();
        assert_eq!(reply, "晴天");
        assert_eq!(agent.memory().len(), 1);
        assert_eq!(agent.memory().all()[0].user_input, "北京天气怎么样");
        // 无人设时不发送 system 消息
        assert_eq!(backend.received()[0].len(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_persona_becomes_system_message() {
        let backend = Arc::new(RecordingBackend::new("ok"));
        let (components, pool) = components_with(
            backend.clone(),
            RetryPolicy::default(),
            PollConfig::new(100, Duration::from_millis(10)),
        );
        let mut agent = Agent::new(
            "2",
            "分析专家",
            Some("你是严谨的分析专家".into()),
            ModelParameters::default(),
        );
        agent.process_task(&components, "analysis", "数据").await.unwrap();

        let sent = &backend.received()[0];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, "你是严谨的分析专家");
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_memory_untouched() {
        let (components, pool) = components_with(
            Arc::new(FailingBackend::new()),
            RetryPolicy::new(2, Duration::from_secs(1)).with_retry_delay(Duration::ZERO),
            PollConfig::new(200, Duration::from_millis(10)),
        );
        let mut agent = agent();
        let err = agent.process_task(&components, "chat", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::BackendFailure(_)));
        assert!(agent.memory().is_empty());
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_backend_failure() {
        let (components, pool) = components_with(
            Arc::new(StallingBackend::new()),
            RetryPolicy::new(1, Duration::from_secs(60)),
            PollConfig::new(5, Duration::from_millis(100)),
        );
        let mut agent = agent();
        let err = agent.process_task(&components, "chat", "hi").await.unwrap_err();
        assert_eq!(err.user_message(), "没有找到响应");
        match err {
            ChatError::Timeout { waited_ms, .. } => assert_eq!(waited_ms, 500),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(agent.memory().is_empty());
        drop(pool);
    }

    #[tokio::test]
    async fn test_retrieved_snippets_enter_prompt() {
        let backend = Arc::new(RecordingBackend::new("ok"));
        let (mut components, pool) = components_with(
            backend.clone(),
            RetryPolicy::default(),
            PollConfig::new(100, Duration::from_millis(10)),
        );
        let kb = Arc::new(InMemoryKnowledgeBase::default());
        kb.add_documents(["北京今天晴，气温二十度。", "上海有小雨。"]);
        components.retrieval = Some(kb);

        let mut agent = agent();
        agent.process_task(&components, "chat", "北京天气").await.unwrap();
        let prompt = backend.last_user_message().unwrap();
        assert!(prompt.contains("相关参考信息：\n北京今天晴"));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_canned_reply_appends_memory() {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::spawn(1, rx, Arc::clone(&store), Arc::new(CannedProcessor::new("unused")));
        let components = AgentComponents {
            dispatcher,
            poller: PollingClient::new(store, PollConfig::new(10, Duration::from_millis(10))),
            templates: Arc::new(InMemoryTemplates::with_defaults()),
            retrieval: None,
            memory_window: 3,
            top_k: 2,
        };
        let mut agent = agent();
        let reply = agent.reply_canned(&components, "你好", "预置").await.unwrap();
        assert_eq!(reply, "预置");
        assert_eq!(agent.memory().len(), 1);
        pool.shutdown().await;
    }
}
