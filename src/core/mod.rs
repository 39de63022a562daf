//! 核心：调用方可见的错误分类

pub mod error;

pub use error::ChatError;
