//! 对话服务：智能体与群组注册表 + 分发流水线的生命周期
//!
//! ChatService 持有共享的 AgentComponents、工作者池与可选的结果清理任务。
//! 每个智能体包在自己的异步互斥锁里：同一智能体的并发任务按到达顺序串行执行，
//! 不同智能体之间互不阻塞。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::Context;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{Agent, AgentComponents};
use crate::config::AppConfig;
use crate::core::ChatError;
use crate::dispatch::{
    BackendProcessor, Dispatcher, PollingClient, RequestProcessor, ResponseStore, WorkerPool,
    WorkerStatsSnapshot,
};
use crate::group::{Discussion, DiscussionRole, DiscussionStep, Group, GroupChatEntry, GroupReply};
use crate::llm::{create_backend_from_config, CompletionBackend, ModelParameters};
use crate::memory::{InMemoryKnowledgeBase, MemoryPersistence, MemoryTurn, RetrievalProvider};
use crate::prompt::{AssembledPrompt, FileTemplateStore, InMemoryTemplates, TaskTemplateProvider};

pub const DEFAULT_GROUP_ID: &str = "main_group";

type SharedAgent = Arc<tokio::sync::Mutex<Agent>>;

/// 内置智能体：(ID, 名称)
fn default_agents() -> [(&'static str, &'static str); 3] {
    [("1", "通用助手"), ("2", "分析专家"), ("3", "领域专家")]
}

/// 服务构建器
pub struct ChatServiceBuilder {
    config: AppConfig,
    backend: Option<Arc<dyn CompletionBackend>>,
    processor: Option<Arc<dyn RequestProcessor>>,
    templates: Option<Arc<dyn TaskTemplateProvider>>,
    knowledge: Option<Arc<InMemoryKnowledgeBase>>,
}

impl ChatServiceBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            backend: None,
            processor: None,
            templates: None,
            knowledge: None,
        }
    }

    /// 指定补全后端（默认按 [llm] 配置创建）
    pub fn with_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 替换工作者的请求处理逻辑（优先于 with_backend）
    pub fn with_processor(mut self, processor: Arc<dyn RequestProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// 指定模板来源（默认使用内置模板）
    pub fn with_templates(mut self, templates: Arc<dyn TaskTemplateProvider>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// 指定知识库；未指定时按 [retrieval] 配置决定是否创建
    pub fn with_knowledge_base(mut self, knowledge: Arc<InMemoryKnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// 启动工作者池并返回服务；须在 tokio 运行时内调用
    pub fn build(self) -> ChatService {
        let cfg = self.config;
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, queue_rx) = Dispatcher::new(Arc::clone(&store));

        let processor = self.processor.unwrap_or_else(|| {
            let backend = self
                .backend
                .unwrap_or_else(|| create_backend_from_config(&cfg.llm));
            Arc::new(BackendProcessor::new(backend, cfg.dispatch.retry_policy()))
        });
        let pool = WorkerPool::spawn(cfg.dispatch.workers, queue_rx, Arc::clone(&store), processor);

        let cancel = CancellationToken::new();
        let sweeper = cfg.dispatch.result_ttl().map(|ttl| {
            let every = Duration::from_secs(cfg.dispatch.sweep_interval_secs.max(1));
            info!(ttl_secs = ttl.as_secs(), "Result expiry enabled");
            store.spawn_sweeper(ttl, every, cancel.clone())
        });

        let knowledge = self.knowledge.or_else(|| {
            cfg.retrieval.enabled.then(|| {
                Arc::new(InMemoryKnowledgeBase::new(
                    cfg.retrieval.chunk_size,
                    cfg.retrieval.chunk_overlap,
                ))
            })
        });

        let components = AgentComponents {
            dispatcher,
            poller: PollingClient::new(store, cfg.dispatch.poll_config()),
            templates: self
                .templates
                .unwrap_or_else(|| Arc::new(InMemoryTemplates::with_defaults())),
            retrieval: knowledge
                .clone()
                .map(|kb| kb as Arc<dyn RetrievalProvider>),
            memory_window: cfg.memory.window,
            top_k: cfg.retrieval.top_k,
        };

        ChatService {
            components,
            agents: RwLock::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            knowledge,
            default_params: RwLock::new(cfg.llm.model_parameters()),
            memory_dir: cfg.app.memory_dir,
            pool: Mutex::new(Some(pool)),
            sweeper: Mutex::new(sweeper),
            cancel,
        }
    }
}

pub struct ChatService {
    components: AgentComponents,
    agents: RwLock<HashMap<String, SharedAgent>>,
    groups: Mutex<HashMap<String, Group>>,
    knowledge: Option<Arc<InMemoryKnowledgeBase>>,
    default_params: RwLock<ModelParameters>,
    memory_dir: PathBuf,
    pool: Mutex<Option<WorkerPool>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl ChatService {
    pub fn builder(config: AppConfig) -> ChatServiceBuilder {
        ChatServiceBuilder::new(config)
    }

    /// 按配置创建：后端来自 [llm]，模板从 [app].prompt_dir 加载并补齐内置模板
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let templates = FileTemplateStore::open(&config.app.prompt_dir)
            .context("Failed to open template store")?;
        templates
            .seed_defaults()
            .context("Failed to save default templates")?;
        Ok(Self::builder(config)
            .with_templates(Arc::new(templates))
            .build())
    }

    /// 注册内置智能体（1 通用助手 / 2 分析专家 / 3 领域专家）与默认群组 main_group
    pub fn with_defaults(self) -> Result<Self, ChatError> {
        for (id, name) in default_agents() {
            self.init_agent(id, name, None)?;
        }
        self.create_group(DEFAULT_GROUP_ID, "默认群组");
        for (id, _) in default_agents() {
            self.add_to_group(DEFAULT_GROUP_ID, id)?;
        }
        Ok(self)
    }

    pub fn components(&self) -> &AgentComponents {
        &self.components
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.components.dispatcher
    }

    pub fn knowledge_base(&self) -> Option<&Arc<InMemoryKnowledgeBase>> {
        self.knowledge.as_ref()
    }

    // ---- 智能体注册表 ----

    /// 注册智能体；ID 已存在时返回 AgentExists
    pub fn init_agent(
        &self,
        id: &str,
        name: &str,
        persona: Option<String>,
    ) -> Result<(), ChatError> {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        if agents.contains_key(id) {
            return Err(ChatError::AgentExists(id.to_string()));
        }
        let params = self.model_parameters();
        let agent = Agent::new(id, name, persona, params);
        agents.insert(id.to_string(), Arc::new(tokio::sync::Mutex::new(agent)));
        info!(agent_id = id, name, "Agent registered");
        Ok(())
    }

    /// 注销智能体并将其移出所有群组
    pub fn remove_agent(&self, id: &str) -> Result<(), ChatError> {
        self.agents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .ok_or_else(|| ChatError::AgentNotFound(id.to_string()))?;
        for group in self.lock_groups().values_mut() {
            group.remove_member(id);
        }
        Ok(())
    }

    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn agent(&self, id: &str) -> Result<SharedAgent, ChatError> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| ChatError::AgentNotFound(id.to_string()))
    }

    // ---- 单轮任务 ----

    /// 调用方入口：让指定智能体处理一轮任务
    pub async fn process_task(
        &self,
        agent_id: &str,
        task_name: &str,
        input: &str,
    ) -> Result<String, ChatError> {
        let agent = self.agent(agent_id)?;
        let mut agent = agent.lock().await;
        agent.process_task(&self.components, task_name, input).await
    }

    /// 以预置文本完成一轮（不调用后端）
    pub async fn reply_canned(
        &self,
        agent_id: &str,
        input: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        let agent = self.agent(agent_id)?;
        let mut agent = agent.lock().await;
        agent.reply_canned(&self.components, input, text).await
    }

    /// 预览下一轮将要发送的 Prompt（不入队）
    pub async fn build_prompt(
        &self,
        agent_id: &str,
        task_name: &str,
        input: &str,
    ) -> Result<AssembledPrompt, ChatError> {
        let agent = self.agent(agent_id)?;
        let agent = agent.lock().await;
        agent.build_prompt(&self.components, task_name, input).await
    }

    // ---- 群组 ----

    fn lock_groups(&self) -> std::sync::MutexGuard<'_, HashMap<String, Group>> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 创建群组，已存在时返回 false
    pub fn create_group(&self, id: &str, name: &str) -> bool {
        let mut groups = self.lock_groups();
        if groups.contains_key(id) {
            return false;
        }
        groups.insert(id.to_string(), Group::new(id, name));
        true
    }

    pub fn add_to_group(&self, group_id: &str, agent_id: &str) -> Result<(), ChatError> {
        self.agent(agent_id)?;
        let mut groups = self.lock_groups();
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| ChatError::GroupNotFound(group_id.to_string()))?;
        group.add_member(agent_id);
        Ok(())
    }

    pub fn group_members(&self, group_id: &str) -> Result<Vec<String>, ChatError> {
        self.lock_groups()
            .get(group_id)
            .map(|g| g.members().to_vec())
            .ok_or_else(|| ChatError::GroupNotFound(group_id.to_string()))
    }

    /// 群聊：消息并发发给除发起者外的全部成员，按成员顺序返回各自回复并记入历史
    pub async fn group_chat(
        &self,
        group_id: &str,
        initiator_id: &str,
        message: &str,
        task_name: &str,
    ) -> Result<Vec<GroupReply>, ChatError> {
        let recipients = {
            let groups = self.lock_groups();
            let group = groups
                .get(group_id)
                .ok_or_else(|| ChatError::GroupNotFound(group_id.to_string()))?;
            if !group.is_member(initiator_id) {
                return Err(ChatError::NotGroupMember {
                    group_id: group_id.to_string(),
                    agent_id: initiator_id.to_string(),
                });
            }
            group.recipients(initiator_id)
        };

        let outcomes = join_all(
            recipients
                .iter()
                .map(|agent_id| self.process_task(agent_id, task_name, message)),
        )
        .await;

        let replies: Vec<GroupReply> = recipients
            .into_iter()
            .zip(outcomes)
            .map(|(agent_id, outcome)| {
                if let Err(e) = &outcome {
                    warn!(group_id, agent_id = %agent_id, error = %e, "Group member failed to reply");
                }
                GroupReply { agent_id, outcome }
            })
            .collect();

        if let Some(group) = self.lock_groups().get_mut(group_id) {
            group.record(GroupChatEntry {
                sender_id: initiator_id.to_string(),
                message: message.to_string(),
                replies: replies.clone(),
            });
        }
        Ok(replies)
    }

    pub fn summarize_chat(&self, group_id: &str, last_n: usize) -> Result<String, ChatError> {
        self.lock_groups()
            .get(group_id)
            .map(|g| g.summarize_chat(last_n))
            .ok_or_else(|| ChatError::GroupNotFound(group_id.to_string()))
    }

    /// 两个智能体的讨论：分析 → 初步方案 → rounds 轮（评估 → 优化）
    pub async fn discuss(
        &self,
        analyzer_id: &str,
        solver_id: &str,
        task: &str,
        rounds: usize,
    ) -> Result<Discussion, ChatError> {
        let mut steps = Vec::new();
        let mut speak = |round, role, speaker_id: &str, content: &str| {
            steps.push(DiscussionStep {
                round,
                role,
                speaker_id: speaker_id.to_string(),
                content: content.to_string(),
            });
        };

        let analysis = self
            .process_task(
                analyzer_id,
                "analyzer",
                &format!("请分析这个任务的关键点和需要考虑的方面：{task}"),
            )
            .await?;
        speak(1, DiscussionRole::Analyzer, analyzer_id, &analysis);

        let mut solution = self
            .process_task(
                solver_id,
                "solver",
                &format!("基于以下分析，请提出初步解决方案：\n{analysis}\n原始任务：{task}"),
            )
            .await?;
        speak(2, DiscussionRole::Solver, solver_id, &solution);

        for round in 3..3 + rounds {
            let feedback = self
                .process_task(
                    analyzer_id,
                    "analyzer",
                    &format!("请评估这个解决方案，指出潜在问题和改进建议：\n{solution}"),
                )
                .await?;
            speak(round, DiscussionRole::Analyzer, analyzer_id, &feedback);

            solution = self
                .process_task(
                    solver_id,
                    "solver",
                    &format!("根据以下反馈优化解决方案：\n{feedback}"),
                )
                .await?;
            speak(round, DiscussionRole::Solver, solver_id, &solution);
        }

        Ok(Discussion {
            task: task.to_string(),
            steps,
            final_solution: solution,
        })
    }

    // ---- 模型参数 ----

    pub fn model_parameters(&self) -> ModelParameters {
        self.default_params
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 切换所有智能体（含之后注册的）使用的模型
    pub async fn set_model(&self, model: &str) {
        self.default_params
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .model = model.to_string();
        for agent in self.all_agents() {
            agent.lock().await.params.model = model.to_string();
        }
        info!(model, "Model switched");
    }

    pub async fn set_temperature(&self, temperature: f32) {
        self.default_params
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .temperature = temperature;
        for agent in self.all_agents() {
            agent.lock().await.params.temperature = temperature;
        }
        info!(temperature, "Temperature changed");
    }

    fn all_agents(&self) -> Vec<SharedAgent> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    // ---- 记忆 ----

    pub async fn memory_snapshot(&self, agent_id: &str) -> Result<Vec<MemoryTurn>, ChatError> {
        let agent = self.agent(agent_id)?;
        let agent = agent.lock().await;
        Ok(agent.memory().all().to_vec())
    }

    /// 导出完整记忆为 JSON；path 为空时写入 <memory_dir>/<agent_id>.json
    pub async fn export_memory(
        &self,
        agent_id: &str,
        path: Option<&Path>,
    ) -> Result<PathBuf, ChatError> {
        let agent = self.agent(agent_id)?;
        let persistence = self.persistence_for(agent_id, path);
        let agent = agent.lock().await;
        persistence
            .save(agent_id, agent.memory())
            .map_err(|e| ChatError::Persistence(format!("{e:#}")))?;
        Ok(persistence.path().to_path_buf())
    }

    /// 从 JSON 导入记忆并整体替换，返回导入的轮数
    pub async fn import_memory(
        &self,
        agent_id: &str,
        path: Option<&Path>,
    ) -> Result<usize, ChatError> {
        let agent = self.agent(agent_id)?;
        let memory = self
            .persistence_for(agent_id, path)
            .load()
            .map_err(|e| ChatError::Persistence(format!("{e:#}")))?;
        let count = memory.len();
        agent.lock().await.replace_memory(memory);
        Ok(count)
    }

    fn persistence_for(&self, agent_id: &str, path: Option<&Path>) -> MemoryPersistence {
        match path {
            Some(p) => MemoryPersistence::new(p),
            None => MemoryPersistence::for_agent(&self.memory_dir, agent_id),
        }
    }

    // ---- 生命周期 ----

    pub fn worker_stats(&self) -> Option<WorkerStatsSnapshot> {
        self.pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.stats())
    }

    /// 停止清理任务与工作者池；处理中的请求完成后返回
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }
        let pool = self.pool.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }
}
