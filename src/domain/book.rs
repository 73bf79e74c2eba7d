//! Book 值对象 - 格式与状态

use thiserror::Error;

/// 不支持的文件格式
#[derive(Debug, Error)]
#[error("Unsupported file format: {0}")]
pub struct UnsupportedFormat(pub String);

/// 电子书格式
///
/// 仅支持白名单内的扩展名，其余一律拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    Pdf,
    Epub,
    Mobi,
    Txt,
    Md,
}

impl BookFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
            BookFormat::Mobi => "mobi",
            BookFormat::Txt => "txt",
            BookFormat::Md => "md",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(BookFormat::Pdf),
            "epub" => Some(BookFormat::Epub),
            "mobi" => Some(BookFormat::Mobi),
            "txt" => Some(BookFormat::Txt),
            "md" => Some(BookFormat::Md),
            _ => None,
        }
    }

    /// 从文件名推导格式（扩展名小写化后匹配白名单）
    pub fn from_filename(filename: &str) -> Result<Self, UnsupportedFormat> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self::from_str(&ext).ok_or(UnsupportedFormat(ext))
    }

    /// 最终渲染/下发的格式（mobi 需转换为 epub，其余保持不变）
    pub fn canonical(&self) -> BookFormat {
        match self {
            BookFormat::Mobi => BookFormat::Epub,
            other => *other,
        }
    }

    /// 是否需要经过转换器才能得到规范格式
    pub fn needs_conversion(&self) -> bool {
        matches!(self, BookFormat::Mobi)
    }

    /// 是否为容器格式（zip 包 + 清单描述文件），可尝试提取元数据/封面
    pub fn is_container(&self) -> bool {
        matches!(self, BookFormat::Epub)
    }
}

/// 图书处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookStatus {
    /// 转换中
    Processing,
    /// 已就绪
    Ready,
    /// 转换失败
    Error,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Processing => "processing",
            BookStatus::Ready => "ready",
            BookStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(BookStatus::Processing),
            "ready" => Some(BookStatus::Ready),
            "error" => Some(BookStatus::Error),
            _ => None,
        }
    }
}

impl Default for BookStatus {
    fn default() -> Self {
        BookStatus::Ready
    }
}

/// 图书列表排序键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSortKey {
    /// 按添加时间倒序（默认）
    AddedAt,
    /// 按标题升序（忽略大小写）
    Title,
    /// 按作者升序（忽略大小写）
    Author,
}

impl BookSortKey {
    /// 未知排序键回退到 AddedAt
    pub fn from_str(s: &str) -> Self {
        match s {
            "title" => BookSortKey::Title,
            "author" => BookSortKey::Author,
            _ => BookSortKey::AddedAt,
        }
    }
}

impl Default for BookSortKey {
    fn default() -> Self {
        BookSortKey::AddedAt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_filename() {
        assert_eq!(
            BookFormat::from_filename("war-and-peace.EPUB").unwrap(),
            BookFormat::Epub
        );
        assert_eq!(
            BookFormat::from_filename("notes.md").unwrap(),
            BookFormat::Md
        );
        assert!(BookFormat::from_filename("archive.zip").is_err());
        assert!(BookFormat::from_filename("no-extension").is_err());
    }

    #[test]
    fn test_canonical_mapping() {
        // mobi 转 epub，其余恒等
        assert_eq!(BookFormat::Mobi.canonical(), BookFormat::Epub);
        for format in [
            BookFormat::Pdf,
            BookFormat::Epub,
            BookFormat::Txt,
            BookFormat::Md,
        ] {
            assert_eq!(format.canonical(), format);
        }
        assert!(BookFormat::Mobi.needs_conversion());
        assert!(!BookFormat::Epub.needs_conversion());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [BookStatus::Processing, BookStatus::Ready, BookStatus::Error] {
            assert_eq!(BookStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(BookStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_sort_key_fallback() {
        assert_eq!(BookSortKey::from_str("title"), BookSortKey::Title);
        assert_eq!(BookSortKey::from_str("author"), BookSortKey::Author);
        assert_eq!(BookSortKey::from_str("dateAdded"), BookSortKey::AddedAt);
        assert_eq!(BookSortKey::from_str(""), BookSortKey::AddedAt);
    }
}
