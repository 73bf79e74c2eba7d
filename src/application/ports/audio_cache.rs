//! Audio Cache Port - 内容寻址音频缓存
//!
//! key = sha256(mode|voice|rate|text)，一 key 一文件。
//! 并发填充依赖文件系统的独占创建语义：同一 key 同时只有一个
//! 写入者能拿到 writer，其余并发请求直接旁路缓存。

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

use super::tts::SpeakRequest;

/// 缓存错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(String),
}

/// 缓存命中：完整写入且非空的文件
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub content_length: u64,
}

/// 独占写入句柄
///
/// 落盘规则：
/// - commit 后零字节文件视为无效并删除
/// - abort 删除已写入的部分内容
/// - 句柄被 drop 而未 commit 时等同 abort
#[async_trait]
pub trait CacheWriter: Send {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), CacheError>;

    /// 完整写入结束，文件转为可命中状态
    async fn commit(self: Box<Self>) -> Result<(), CacheError>;

    /// 写入中断，清除部分文件
    async fn abort(self: Box<Self>);
}

/// Audio Cache Port
#[async_trait]
pub trait AudioCachePort: Send + Sync {
    /// 按 key 探测缓存，遍历已知的 content-type/扩展名组合
    async fn find(&self, key: &str) -> Option<CacheHit>;

    /// 以独占创建方式开始写入；key 已被占用时返回 None
    async fn begin_write(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Option<Box<dyn CacheWriter>>, CacheError>;

    /// 将一个完成的文件复制进缓存；已存在或复制失败时静默放弃
    async fn insert_file(&self, key: &str, content_type: &str, source: &std::path::Path);
}

/// 生成缓存 key
///
/// 对 (mode, voice, rate, text) 的有序组合做 SHA-256，字段间以 "|" 分隔。
/// 语速按最短十进制表示拼入（1.0 记为 "1"），使缺省语速与显式 1 同 key。
pub fn cache_key(request: &SpeakRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.mode.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(request.voice.as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{}", request.rate_or_default()).as_bytes());
    hasher.update(b"|");
    hasher.update(request.text.as_bytes());
    format!("{:x}", hasher.finalize())
}
