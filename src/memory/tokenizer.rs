//! 检索分词
//!
//! 中文（CJK）文本用 jieba 搜索引擎模式切分，其余按空白切分；
//! 统一小写并去掉纯标点词，供知识库打分使用。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 有意义的词：含 CJK 字符，或长度大于 1 且含字母数字
fn is_meaningful(token: &str) -> bool {
    if token.chars().any(is_cjk) {
        return true;
    }
    token.chars().count() > 1 && token.chars().any(char::is_alphanumeric)
}

pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let raw: Vec<String> = if contains_cjk(text) {
        jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .collect()
    } else {
        text.split_whitespace()
            .map(|s| {
                s.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .collect()
    };

    raw.into_iter().filter(|t| is_meaningful(t)).collect()
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 查询词在文档词集合中的命中数；较长的 CJK 词多计一分，优先短语级匹配
pub fn overlap_score(query: &HashSet<String>, doc: &HashSet<String>) -> usize {
    query
        .intersection(doc)
        .map(|t| if t.chars().count() >= 2 && contains_cjk(t) { 2 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("机器学习是人工智能的一个子领域");
        assert!(tokens.iter().any(|t| t == "机器" || t == "学习" || t == "机器学习"));
    }

    #[test]
    fn test_tokenize_english_strips_punctuation() {
        let tokens = tokenize("Hello, Rust world!");
        assert_eq!(tokens, vec!["hello", "rust", "world"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_overlap_score() {
        let q = tokenize_to_set("深度学习 神经网络");
        let hit = tokenize_to_set("深度学习是机器学习的一种方法，使用多层神经网络处理复杂问题。");
        let miss = tokenize_to_set("今天北京晴天");
        assert!(overlap_score(&q, &hit) > 0);
        assert_eq!(overlap_score(&q, &miss), 0);
    }
}
