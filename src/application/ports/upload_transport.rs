use crate::shared::error::AppError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub url: String,
}

/// Single-call file upload to the out-of-scope storage endpoint. The
/// returned URL is treated as an opaque field value everywhere else.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<UploadedFile, AppError>;
}
