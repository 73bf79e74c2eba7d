//! Booktainer - 电子书上传与 TTS 朗读服务
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Book: 格式白名单、处理状态、排序键
//! - Epub: EPUB 容器解析（元数据 + 封面）
//!
//! 应用层 (application/):
//! - Ports: 端口定义（BookRepository, ProgressRepository, Converter,
//!   TtsProvider, AudioCache, TokenStore）
//! - Services: Ingestion / Speech / Progress 用例编排
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API（文件下发支持 Range）
//! - Memory: 播放令牌内存存储
//! - Persistence: SQLite 记录 + 文件系统音频缓存
//! - Adapters: OpenAI / Piper TTS、ebook-convert 转换器

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
