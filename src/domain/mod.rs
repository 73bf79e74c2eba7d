//! Domain Layer - 领域层
//!
//! 纯领域逻辑，无 I/O 依赖：
//! - book: 图书格式/状态值对象
//! - epub: EPUB 容器解析（字节进、元数据/封面出）

pub mod book;
pub mod epub;

pub use book::{BookFormat, BookSortKey, BookStatus, UnsupportedFormat};
pub use epub::{CoverImage, EpubPackage, ManifestItem};
