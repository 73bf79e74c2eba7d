//! 内存态基础设施

mod token_store;

pub use token_store::InMemoryTokenStore;
