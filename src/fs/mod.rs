pub mod error;
pub mod path;

pub use error::{FsError, FsResult};

/// Run blocking filesystem work off the async worker threads.
pub(crate) async fn blocking<T, F>(f: F) -> FsResult<T>
where
    F: FnOnce() -> FsResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| FsError::Io(std::io::Error::other(e)))?
}
