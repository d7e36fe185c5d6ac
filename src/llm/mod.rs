pub mod adapter;
#[cfg(feature = "gemini")]
pub mod client;
#[cfg(feature = "openai")]
pub mod openai;
pub mod oracle;
pub mod prompts;
pub mod types;

pub use adapter::*;
#[cfg(feature = "gemini")]
pub use client::*;
#[cfg(feature = "openai")]
pub use openai::*;
pub use oracle::*;
pub use prompts::*;
pub use types::*;
