//! HTTP Handlers

mod books;
mod ping;
mod progress;
mod tts;

pub use books::{
    delete_book, get_book, get_book_cover, get_book_file, list_books, update_book, upload_book,
};
pub use ping::ping;
pub use progress::{get_progress, put_progress};
pub use tts::{install_voice, list_voices, speak, speak_url, speak_with_token, voice_catalog};
