use crate::application::ports::UploadTransport;
use crate::shared::error::{AppError, Result};
use std::sync::Arc;

/// Thin front over the upload transport; the returned URL is stored as an
/// opaque field value on whatever record references the file.
pub struct UploadService {
    transport: Arc<dyn UploadTransport>,
}

impl UploadService {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self { transport }
    }

    pub async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        if bytes.is_empty() {
            return Err(AppError::Upload("Cannot upload an empty file".to_string()));
        }
        let uploaded = self.transport.upload(bytes, filename).await?;
        Ok(uploaded.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::UploadedFile;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Transport {}

        #[async_trait]
        impl UploadTransport for Transport {
            async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<UploadedFile>;
        }
    }

    #[tokio::test]
    async fn upload_returns_the_remote_url() {
        let mut transport = MockTransport::new();
        transport
            .expect_upload()
            .times(1)
            .withf(|bytes, filename| bytes == b"png-bytes" && filename == "cat.png")
            .returning(|_, _| {
                Ok(UploadedFile {
                    url: "https://files.example/uploads/123.png".to_string(),
                })
            });

        let service = UploadService::new(Arc::new(transport));
        let url = service.upload(b"png-bytes".to_vec(), "cat.png").await.unwrap();
        assert_eq!(url, "https://files.example/uploads/123.png");
    }

    #[tokio::test]
    async fn empty_payload_is_rejected_before_the_network() {
        let mut transport = MockTransport::new();
        transport.expect_upload().times(0);

        let service = UploadService::new(Arc::new(transport));
        let err = service.upload(Vec::new(), "cat.png").await.unwrap_err();
        assert!(matches!(err, AppError::Upload(_)));
    }

    #[tokio::test]
    async fn transport_errors_surface_as_is() {
        let mut transport = MockTransport::new();
        transport
            .expect_upload()
            .times(1)
            .returning(|_, _| Err(AppError::Network("connection reset".to_string())));

        let service = UploadService::new(Arc::new(transport));
        let err = service.upload(b"data".to_vec(), "cat.png").await.unwrap_err();
        assert!(matches!(err, AppError::Network(_)));
    }
}
