//! 知识检索：为 Prompt 提供相关参考片段
//!
//! RetrievalProvider 是可选协作者，缺失时核心流程照常工作（零参考信息）。
//! InMemoryKnowledgeBase：文档按字符窗口切块（chunk_size / chunk_overlap），
//! 按查询词命中数排序取 top_k；后续可替换为真实向量库。

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::memory::tokenizer::{overlap_score, tokenize_to_set};

/// 检索接口
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// 按查询返回最相关的 top_k 条片段
    async fn relevant_snippets(&self, query: &str, top_k: usize) -> Vec<String>;
}

/// 空实现：未启用检索时使用
#[derive(Clone, Debug, Default)]
pub struct NoopRetrieval;

#[async_trait]
impl RetrievalProvider for NoopRetrieval {
    async fn relevant_snippets(&self, _query: &str, _top_k: usize) -> Vec<String> {
        Vec::new()
    }
}

struct Chunk {
    text: String,
    tokens: HashSet<String>,
}

/// 内存知识库
pub struct InMemoryKnowledgeBase {
    chunks: RwLock<Vec<Chunk>>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl InMemoryKnowledgeBase {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunks: RwLock::new(Vec::new()),
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// 切块并加入知识库，返回新增块数
    pub fn add_documents<I, S>(&self, documents: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for doc in documents {
            for piece in split_chunks(doc.as_ref(), self.chunk_size, self.chunk_overlap) {
                let tokens = tokenize_to_set(&piece);
                added.push(Chunk { text: piece, tokens });
            }
        }
        let count = added.len();
        self.chunks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(added);
        count
    }

    pub fn clear(&self) {
        self.chunks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<String> {
        let query_tokens = tokenize_to_set(query);
        if query_tokens.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(usize, usize)> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (overlap_score(&query_tokens, &c.tokens), i))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 同分按插入顺序，保证结果确定
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, i)| chunks[i].text.clone())
            .collect()
    }
}

impl Default for InMemoryKnowledgeBase {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

#[async_trait]
impl RetrievalProvider for InMemoryKnowledgeBase {
    async fn relevant_snippets(&self, query: &str, top_k: usize) -> Vec<String> {
        self.search(query, top_k)
    }
}

/// 按字符窗口切块，相邻块重叠 overlap 个字符
fn split_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    pieces
}
