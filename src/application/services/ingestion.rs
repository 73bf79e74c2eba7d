//! Ingestion Service - 上传/转换/提取编排
//!
//! 接收上传字节，落盘为 original.<ext>，必要时调用外部转换器
//! 得到规范格式，再从容器格式里尽力提取元数据与封面。
//! 转换对上传请求是同步的：accept 返回时状态机已走到终态。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::application::error::ApplicationError;
use crate::application::ports::{BookRecord, BookRepositoryPort, ConverterPort};
use crate::domain::{BookFormat, BookSortKey, BookStatus, EpubPackage};

/// 存储布局配置
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// 每本书一个目录：<library_dir>/<id>/original.<ext>
    pub library_dir: PathBuf,
    /// 封面平铺存放：<covers_dir>/<id>.<ext>
    pub covers_dir: PathBuf,
}

/// 从 EPUB 提取到的元数据（全部字段可缺失）
#[derive(Debug, Default)]
struct ExtractedMeta {
    title: Option<String>,
    author: Option<String>,
}

/// Ingestion Service
pub struct IngestionService {
    config: IngestionConfig,
    books: Arc<dyn BookRepositoryPort>,
    converter: Arc<dyn ConverterPort>,
}

impl IngestionService {
    pub fn new(
        config: IngestionConfig,
        books: Arc<dyn BookRepositoryPort>,
        converter: Arc<dyn ConverterPort>,
    ) -> Self {
        Self {
            config,
            books,
            converter,
        }
    }

    /// 接收上传
    ///
    /// 扩展名不在白名单内时直接拒绝，不产生任何记录或文件。
    /// mobi 在本调用内同步转换：成功转入 ready，失败转入 error
    /// 并保留转换器的诊断信息；原始文件两种情况下都保留。
    pub async fn accept(
        &self,
        owner_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<BookRecord, ApplicationError> {
        let format = BookFormat::from_filename(filename)
            .map_err(|_| ApplicationError::validation("Unsupported file format"))?;

        let id = Uuid::new_v4();
        let book_dir = self.config.library_dir.join(id.to_string());
        tokio::fs::create_dir_all(&book_dir)
            .await
            .map_err(|e| ApplicationError::storage(e.to_string()))?;

        let original_path = book_dir.join(format!("original.{}", format.as_str()));
        tokio::fs::write(&original_path, &bytes)
            .await
            .map_err(|e| ApplicationError::storage(e.to_string()))?;

        let mut title = filename_stem(filename);
        let mut author = None;

        // 容器格式在上传时同步尽力提取；解析失败保留默认值
        if format.is_container() {
            let meta = extract_metadata(bytes.clone());
            if let Some(t) = meta.title {
                title = t;
            }
            author = meta.author;
        }

        let now = Utc::now();
        let status = if format.needs_conversion() {
            BookStatus::Processing
        } else {
            BookStatus::Ready
        };

        let record = BookRecord {
            id,
            owner_id: owner_id.to_string(),
            title,
            author,
            format,
            canonical_format: format.canonical(),
            added_at: now,
            updated_at: now,
            original_path: original_path.clone(),
            canonical_path: None,
            cover_path: None,
            status,
            error_message: None,
        };
        self.books.insert(&record).await?;

        if format.needs_conversion() {
            self.convert_and_extract(owner_id, id, &record, &book_dir)
                .await?;
        } else if format.is_container() {
            if let Some(cover_path) = self.save_cover(bytes, id).await {
                self.books.update_cover(owner_id, id, &cover_path).await?;
            }
        }

        self.books
            .find(owner_id, id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Book", id))
    }

    /// mobi 的同步转换 + 规范产物的元数据/封面回填
    async fn convert_and_extract(
        &self,
        owner_id: &str,
        id: Uuid,
        record: &BookRecord,
        book_dir: &Path,
    ) -> Result<(), ApplicationError> {
        let canonical_path = book_dir.join("canonical.epub");

        match self
            .converter
            .convert(&record.original_path, &canonical_path)
            .await
        {
            Ok(()) => {
                if let Ok(bytes) = tokio::fs::read(&canonical_path).await {
                    let meta = extract_metadata(bytes.clone());
                    if meta.title.is_some() || meta.author.is_some() {
                        // 元数据字段仅在非空时覆盖上传时的默认值
                        let title = meta.title.as_deref().unwrap_or(&record.title);
                        self.books
                            .update_metadata(owner_id, id, title, meta.author.as_deref())
                            .await?;
                    }
                    if let Some(cover_path) = self.save_cover(bytes, id).await {
                        self.books.update_cover(owner_id, id, &cover_path).await?;
                    }
                }
                self.books
                    .update_status(owner_id, id, BookStatus::Ready, None, Some(&canonical_path))
                    .await?;
                tracing::info!(book_id = %id, "Conversion completed");
            }
            Err(err) => {
                let message = err.message();
                tracing::warn!(book_id = %id, error = %message, "Conversion failed");
                self.books
                    .update_status(owner_id, id, BookStatus::Error, Some(&message), None)
                    .await?;
            }
        }
        Ok(())
    }

    /// 提取封面写入封面目录；任何一步失败都按"无封面"处理
    async fn save_cover(&self, bytes: Vec<u8>, id: Uuid) -> Option<PathBuf> {
        let mut pkg = EpubPackage::open(bytes)?;
        let cover = pkg.cover()?;
        let target = self.config.covers_dir.join(format!("{}.{}", id, cover.ext));
        match tokio::fs::write(&target, &cover.data).await {
            Ok(()) => Some(target),
            Err(e) => {
                tracing::warn!(book_id = %id, error = %e, "Failed to write cover");
                None
            }
        }
    }

    /// 查找单本图书
    pub async fn get(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> Result<Option<BookRecord>, ApplicationError> {
        Ok(self.books.find(owner_id, id).await?)
    }

    /// 列出图书
    pub async fn list(
        &self,
        owner_id: &str,
        sort: BookSortKey,
        query: Option<&str>,
    ) -> Result<Vec<BookRecord>, ApplicationError> {
        Ok(self.books.list(owner_id, sort, query).await?)
    }

    /// 编辑标题/作者
    ///
    /// title 提供时 trim 后必须非空；author 提供空串/null 时清空。
    /// author 的外层 Option 区分"未提供"与"提供了 null"。
    pub async fn update(
        &self,
        owner_id: &str,
        id: Uuid,
        title: Option<String>,
        author: Option<Option<String>>,
    ) -> Result<BookRecord, ApplicationError> {
        let record = self
            .books
            .find(owner_id, id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Book", id))?;

        let new_title = match title {
            Some(raw) => {
                let trimmed = raw.trim().to_string();
                if trimmed.is_empty() {
                    return Err(ApplicationError::validation("Missing title"));
                }
                trimmed
            }
            None => record.title.clone(),
        };

        let new_author = match author {
            Some(provided) => provided.and_then(|a| {
                let trimmed = a.trim().to_string();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed)
                }
            }),
            None => record.author.clone(),
        };

        self.books
            .update_metadata(owner_id, id, &new_title, new_author.as_deref())
            .await?;

        self.books
            .find(owner_id, id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Book", id))
    }

    /// 删除图书：存储目录、封面文件、记录（含阅读进度级联）
    ///
    /// 文件删除是幂等的，目录/封面缺失不算错误。
    pub async fn remove(&self, owner_id: &str, id: Uuid) -> Result<bool, ApplicationError> {
        let record = match self.books.find(owner_id, id).await? {
            Some(record) => record,
            None => return Ok(false),
        };

        if let Some(book_dir) = record.original_path.parent() {
            if let Err(e) = tokio::fs::remove_dir_all(book_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(ApplicationError::storage(e.to_string()));
                }
            }
        }
        if let Some(cover_path) = &record.cover_path {
            let _ = tokio::fs::remove_file(cover_path).await;
        }

        let deleted = self.books.delete(owner_id, id).await?;
        tracing::info!(book_id = %id, deleted, "Book removed");
        Ok(deleted)
    }
}

/// 文件名去掉扩展名作为默认标题；不可用时退回原文件名
fn filename_stem(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    stem.to_string()
}

fn extract_metadata(bytes: Vec<u8>) -> ExtractedMeta {
    match EpubPackage::open(bytes) {
        Some(pkg) => ExtractedMeta {
            title: pkg.title().map(|s| s.to_string()),
            author: pkg.creator().map(|s| s.to_string()),
        },
        None => ExtractedMeta::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;

    use crate::application::ports::{ConversionError, RepositoryError};

    /// 内存图书仓储（仅测试用）
    #[derive(Default)]
    struct MemoryBookRepo {
        rows: Mutex<HashMap<Uuid, BookRecord>>,
    }

    #[async_trait]
    impl BookRepositoryPort for MemoryBookRepo {
        async fn insert(&self, book: &BookRecord) -> Result<(), RepositoryError> {
            self.rows.lock().unwrap().insert(book.id, book.clone());
            Ok(())
        }

        async fn find(
            &self,
            owner_id: &str,
            id: Uuid,
        ) -> Result<Option<BookRecord>, RepositoryError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&id)
                .filter(|b| b.owner_id == owner_id)
                .cloned())
        }

        async fn list(
            &self,
            owner_id: &str,
            _sort: BookSortKey,
            _query: Option<&str>,
        ) -> Result<Vec<BookRecord>, RepositoryError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|b| b.owner_id == owner_id)
                .cloned()
                .collect())
        }

        async fn update_status(
            &self,
            _owner_id: &str,
            id: Uuid,
            status: BookStatus,
            error_message: Option<&str>,
            canonical_path: Option<&Path>,
        ) -> Result<(), RepositoryError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
                row.status = status;
                row.error_message = error_message.map(|s| s.to_string());
                row.canonical_path = canonical_path.map(|p| p.to_path_buf());
            }
            Ok(())
        }

        async fn update_metadata(
            &self,
            _owner_id: &str,
            id: Uuid,
            title: &str,
            author: Option<&str>,
        ) -> Result<(), RepositoryError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
                row.title = title.to_string();
                row.author = author.map(|s| s.to_string());
            }
            Ok(())
        }

        async fn update_cover(
            &self,
            _owner_id: &str,
            id: Uuid,
            cover_path: &Path,
        ) -> Result<(), RepositoryError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
                row.cover_path = Some(cover_path.to_path_buf());
            }
            Ok(())
        }

        async fn delete(&self, _owner_id: &str, id: Uuid) -> Result<bool, RepositoryError> {
            Ok(self.rows.lock().unwrap().remove(&id).is_some())
        }
    }

    /// 可编程的假转换器
    struct FakeConverter {
        /// Some(bytes) 时把 bytes 写入输出路径并成功；None 时失败
        output: Option<Vec<u8>>,
    }

    #[async_trait]
    impl ConverterPort for FakeConverter {
        async fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConversionError> {
            match &self.output {
                Some(bytes) => {
                    tokio::fs::write(output, bytes).await.unwrap();
                    Ok(())
                }
                None => Err(ConversionError::Failed(
                    "ebook-convert exited with code 1".to_string(),
                )),
            }
        }
    }

    fn build_minimal_epub(title: &str, author: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("META-INF/container.xml", options)
            .unwrap();
        writer
            .write_all(
                br#"<container><rootfiles><rootfile full-path="content.opf"/></rootfiles></container>"#,
            )
            .unwrap();
        writer.start_file("content.opf", options).unwrap();
        writer
            .write_all(
                format!(
                    r#"<package><metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                         <dc:title>{title}</dc:title><dc:creator>{author}</dc:creator>
                       </metadata>
                       <manifest>
                         <item id="c" href="cover.jpg" media-type="image/jpeg" properties="cover-image"/>
                       </manifest></package>"#
                )
                .as_bytes(),
            )
            .unwrap();
        writer.start_file("cover.jpg", options).unwrap();
        writer.write_all(b"JPEGDATA").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn service(dir: &Path, converter: FakeConverter) -> (IngestionService, Arc<MemoryBookRepo>) {
        let repo = Arc::new(MemoryBookRepo::default());
        let config = IngestionConfig {
            library_dir: dir.join("library"),
            covers_dir: dir.join("covers"),
        };
        std::fs::create_dir_all(&config.covers_dir).unwrap();
        (
            IngestionService::new(config, repo.clone(), Arc::new(converter)),
            repo,
        )
    }

    #[tokio::test]
    async fn test_accept_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repo) = service(dir.path(), FakeConverter { output: None });

        let result = service.accept("u1", "payload.exe", vec![1, 2, 3]).await;
        assert!(matches!(result, Err(ApplicationError::ValidationError(_))));
        // 拒绝发生在任何变更之前
        assert!(repo.rows.lock().unwrap().is_empty());
        assert!(std::fs::read_dir(dir.path().join("library")).is_err()
            || std::fs::read_dir(dir.path().join("library")).unwrap().count() == 0);
    }

    #[tokio::test]
    async fn test_accept_all_supported_formats() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(
            dir.path(),
            FakeConverter {
                output: Some(build_minimal_epub("T", "A")),
            },
        );

        for (filename, format, canonical) in [
            ("a.pdf", BookFormat::Pdf, BookFormat::Pdf),
            ("b.epub", BookFormat::Epub, BookFormat::Epub),
            ("c.mobi", BookFormat::Mobi, BookFormat::Epub),
            ("d.txt", BookFormat::Txt, BookFormat::Txt),
            ("e.md", BookFormat::Md, BookFormat::Md),
        ] {
            let record = service.accept("u1", filename, b"data".to_vec()).await.unwrap();
            assert_eq!(record.format, format, "{filename}");
            assert_eq!(record.canonical_format, canonical, "{filename}");
        }
    }

    #[tokio::test]
    async fn test_plain_upload_is_ready_with_stem_title() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeConverter { output: None });

        let record = service
            .accept("u1", "My Notes.txt", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(record.status, BookStatus::Ready);
        assert_eq!(record.title, "My Notes");
        assert_eq!(record.author, None);
        assert!(record.canonical_path.is_none());
        assert!(record.original_path.exists());
    }

    #[tokio::test]
    async fn test_epub_upload_extracts_metadata_and_cover() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeConverter { output: None });

        let epub = build_minimal_epub("Dune", "Frank Herbert");
        let record = service.accept("u1", "dune.epub", epub).await.unwrap();
        assert_eq!(record.status, BookStatus::Ready);
        assert_eq!(record.title, "Dune");
        assert_eq!(record.author.as_deref(), Some("Frank Herbert"));
        let cover = record.cover_path.unwrap();
        assert_eq!(std::fs::read(cover).unwrap(), b"JPEGDATA");
    }

    #[tokio::test]
    async fn test_broken_epub_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeConverter { output: None });

        // 非 zip 字节：解析退化为无元数据/无封面，上传本身不失败
        let record = service
            .accept("u1", "broken.epub", b"not a zip".to_vec())
            .await
            .unwrap();
        assert_eq!(record.status, BookStatus::Ready);
        assert_eq!(record.title, "broken");
        assert!(record.cover_path.is_none());
    }

    #[tokio::test]
    async fn test_mobi_conversion_success() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(
            dir.path(),
            FakeConverter {
                output: Some(build_minimal_epub("Converted Title", "Converted Author")),
            },
        );

        let record = service
            .accept("u1", "book.mobi", b"MOBIDATA".to_vec())
            .await
            .unwrap();
        assert_eq!(record.status, BookStatus::Ready);
        assert_eq!(record.canonical_format, BookFormat::Epub);
        assert_eq!(record.title, "Converted Title");
        assert_eq!(record.author.as_deref(), Some("Converted Author"));
        let canonical = record.canonical_path.unwrap();
        assert!(canonical.ends_with("canonical.epub"));
        assert!(canonical.exists());
        assert!(record.cover_path.is_some());
    }

    #[tokio::test]
    async fn test_mobi_conversion_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeConverter { output: None });

        let record = service
            .accept("u1", "book.mobi", b"MOBIDATA".to_vec())
            .await
            .unwrap();
        assert_eq!(record.status, BookStatus::Error);
        assert_eq!(
            record.error_message.as_deref(),
            Some("ebook-convert exited with code 1")
        );
        assert!(record.canonical_path.is_none());
        // 原始文件保持可取
        assert!(record.original_path.exists());
    }

    #[tokio::test]
    async fn test_update_title_and_author_rules() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeConverter { output: None });
        let record = service.accept("u1", "a.txt", b"x".to_vec()).await.unwrap();

        // 空标题被拒绝
        let err = service
            .update("u1", record.id, Some("   ".to_string()), None)
            .await;
        assert!(matches!(err, Err(ApplicationError::ValidationError(_))));

        // 正常改名 + 设置作者
        let updated = service
            .update(
                "u1",
                record.id,
                Some("  New Title ".to_string()),
                Some(Some("Anon".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "New Title");
        assert_eq!(updated.author.as_deref(), Some("Anon"));

        // 提供空作者清空为 null
        let updated = service
            .update("u1", record.id, None, Some(Some("  ".to_string())))
            .await
            .unwrap();
        assert_eq!(updated.author, None);

        // 不属于该用户 → NotFound
        let err = service.update("u2", record.id, None, None).await;
        assert!(matches!(err, Err(ApplicationError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_deletes_directory_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeConverter { output: None });
        let record = service
            .accept("u1", "cover.epub", build_minimal_epub("T", "A"))
            .await
            .unwrap();

        let book_dir = record.original_path.parent().unwrap().to_path_buf();
        let cover_path = record.cover_path.clone().unwrap();

        // 预先删掉目录模拟部分状态，remove 仍应成功
        std::fs::remove_dir_all(&book_dir).unwrap();
        assert!(service.remove("u1", record.id).await.unwrap());
        assert!(!cover_path.exists());

        // 第二次删除：记录已不存在
        assert!(!service.remove("u1", record.id).await.unwrap());
    }
}
