//! EPUB 容器解析 - 纯函数式解析器
//!
//! 字节进、结构化数据出，不触碰任何外部状态。
//! 所有解析失败均退化为 None，由调用方决定如何降级，
//! 绝不向摄取流程抛出致命错误。

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

/// 容器描述文件的固定位置
const CONTAINER_PATH: &str = "META-INF/container.xml";

/// 清单条目（package document 中的 `<item>`）
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: String,
}

impl ManifestItem {
    /// properties 为空格分隔的 token 列表
    fn has_property(&self, token: &str) -> bool {
        self.properties.split_whitespace().any(|p| p == token)
    }
}

/// 封面图片字节及推导出的文件扩展名
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub ext: String,
}

/// 已解析的 EPUB 包（仅在一次解析调用期间存活，不做持久化）
pub struct EpubPackage {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    /// package document 所在目录（POSIX 路径，用于解析相对 href）
    opf_dir: String,
    title: Option<String>,
    creator: Option<String>,
    /// 旧式 `<meta name="cover" content="...">` 指向的清单条目 id
    legacy_cover_id: Option<String>,
    manifest: Vec<ManifestItem>,
}

impl EpubPackage {
    /// 打开 EPUB 形状的压缩包
    ///
    /// 缺少 container.xml、找不到 rootfile、package document 不可读，
    /// 均视为"不是有效容器"，返回 None。
    pub fn open(bytes: Vec<u8>) -> Option<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).ok()?;

        let container_xml = read_entry_string(&mut archive, CONTAINER_PATH)?;
        let opf_path = parse_rootfile_path(&container_xml)?;
        let opf_xml = read_entry_string(&mut archive, &opf_path)?;

        let opf_dir = match opf_path.rfind('/') {
            Some(idx) => opf_path[..idx].to_string(),
            None => String::new(),
        };

        let parsed = parse_package_document(&opf_xml)?;

        Some(Self {
            archive,
            opf_dir,
            title: parsed.title,
            creator: parsed.creator,
            legacy_cover_id: parsed.legacy_cover_id,
            manifest: parsed.manifest,
        })
    }

    /// 标题（已归一化，空白串视为缺失）
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// 作者（dc:creator，已归一化）
    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// 解析封面图片，优先级严格为：
    /// 1. 旧式 cover 指针指向的清单条目
    /// 2. properties 含 "cover-image" 的首个清单条目
    /// 3. 无封面
    pub fn cover(&mut self) -> Option<CoverImage> {
        let item = self.resolve_cover_item()?.clone();

        let entry_path = normalize_posix(&join_posix(&self.opf_dir, &item.href));
        let mut file = self.archive.by_name(&entry_path).ok()?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).ok()?;

        let ext = ext_from_media_type(&item.media_type)
            .or_else(|| ext_from_href(&item.href))
            .unwrap_or_else(|| "jpg".to_string());

        Some(CoverImage { data, ext })
    }

    fn resolve_cover_item(&self) -> Option<&ManifestItem> {
        if let Some(cover_id) = &self.legacy_cover_id {
            if let Some(item) = self.manifest.iter().find(|item| &item.id == cover_id) {
                return Some(item);
            }
        }
        self.manifest
            .iter()
            .find(|item| item.has_property("cover-image"))
    }
}

/// 读取压缩包内指定条目的全部文本
fn read_entry_string(
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    name: &str,
) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;
    Some(content)
}

/// 从 container.xml 中取首个 rootfile 的 full-path
///
/// rootfile 节点可能出现一次或多次，始终取第一个。
fn parse_rootfile_path(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"rootfile" {
                    if let Ok(Some(attr)) = e.try_get_attribute("full-path") {
                        let path = attr.unescape_value().ok()?.into_owned();
                        if !path.is_empty() {
                            return Some(path);
                        }
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

struct ParsedPackage {
    title: Option<String>,
    creator: Option<String>,
    legacy_cover_id: Option<String>,
    manifest: Vec<ManifestItem>,
}

/// 解析 package document：元数据字段 + 清单条目
///
/// 元数据字段取首个出现的值；文本归一化为 trim 后非空串。
fn parse_package_document(xml: &str) -> Option<ParsedPackage> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_metadata = false;
    let mut in_manifest = false;
    // 正在收集文本的元数据字段（"title" 或 "creator"）
    let mut capturing: Option<&'static str> = None;
    let mut buffer = String::new();

    let mut title: Option<String> = None;
    let mut creator: Option<String> = None;
    let mut legacy_cover_id: Option<String> = None;
    let mut manifest = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"metadata" => in_metadata = true,
                b"manifest" => in_manifest = true,
                b"title" if in_metadata && title.is_none() => {
                    capturing = Some("title");
                    buffer.clear();
                }
                b"creator" if in_metadata && creator.is_none() => {
                    capturing = Some("creator");
                    buffer.clear();
                }
                b"meta" if in_metadata => {
                    collect_legacy_cover(&e, &mut legacy_cover_id);
                }
                b"item" if in_manifest => {
                    if let Some(item) = collect_manifest_item(&e) {
                        manifest.push(item);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"meta" if in_metadata => {
                    collect_legacy_cover(&e, &mut legacy_cover_id);
                }
                b"item" if in_manifest => {
                    if let Some(item) = collect_manifest_item(&e) {
                        manifest.push(item);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if capturing.is_some() {
                    if let Ok(text) = t.unescape() {
                        buffer.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"metadata" => in_metadata = false,
                b"manifest" => in_manifest = false,
                b"title" | b"creator" => {
                    if let Some(field) = capturing.take() {
                        let value = normalize_text(&buffer);
                        match field {
                            "title" => title = title.or(value),
                            "creator" => creator = creator.or(value),
                            _ => {}
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    Some(ParsedPackage {
        title,
        creator,
        legacy_cover_id,
        manifest,
    })
}

/// `<meta name="cover" content="ID">` 形状的旧式封面指针，取第一个
fn collect_legacy_cover(
    e: &quick_xml::events::BytesStart<'_>,
    slot: &mut Option<String>,
) {
    if slot.is_some() {
        return;
    }
    let name = attr_value(e, "name");
    let content = attr_value(e, "content");
    if name.as_deref() == Some("cover") {
        if let Some(content) = content {
            if !content.is_empty() {
                *slot = Some(content);
            }
        }
    }
}

fn collect_manifest_item(e: &quick_xml::events::BytesStart<'_>) -> Option<ManifestItem> {
    let href = attr_value(e, "href")?;
    Some(ManifestItem {
        id: attr_value(e, "id").unwrap_or_default(),
        href,
        media_type: attr_value(e, "media-type").unwrap_or_default(),
        properties: attr_value(e, "properties").unwrap_or_default(),
    })
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// 元数据文本归一化：trim 后空串视为缺失
fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// POSIX 风格路径拼接
fn join_posix(dir: &str, href: &str) -> String {
    if dir.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", dir, href)
    }
}

/// 归一化 POSIX 路径中的 "." 与 ".." 段
fn normalize_posix(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn ext_from_media_type(media_type: &str) -> Option<String> {
    let ext = match media_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        _ => return None,
    };
    Some(ext.to_string())
}

fn ext_from_href(href: &str) -> Option<String> {
    let ext = href.rsplit_once('.')?.1;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
