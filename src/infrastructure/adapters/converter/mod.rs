//! 格式转换适配器

mod ebook_convert;

pub use ebook_convert::EbookConvertAdapter;
