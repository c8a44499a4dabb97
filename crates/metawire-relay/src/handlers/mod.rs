//! Built-in envelope handlers (stdout dumps).

pub mod json_dump;
pub mod raw_dump;

use tokio::io::AsyncWrite;

pub use json_dump::JsonDumpHandler;
pub use raw_dump::RawDumpHandler;

/// Where dump handlers write.
pub type Output = Box<dyn AsyncWrite + Send + Unpin>;

pub fn stdout() -> Output {
    Box::new(tokio::io::stdout())
}
