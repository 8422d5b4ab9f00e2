use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;

pub struct ContextBuilder;

impl ContextBuilder {
    /// Dockerfile のみを含むビルドコンテキストを tar.gz としてメモリ上に作成
    pub fn from_dockerfile(dockerfile: &str) -> BuildResult<Vec<u8>> {
        let content = dockerfile.as_bytes();

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_path("Dockerfile").map_err(|e| {
                BuildError::InvalidConfig(format!("Failed to set Dockerfile path: {}", e))
            })?;
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            tar.append(&header, content)?;

            // finish 後に GzEncoder を閉じて末尾を書き出す
            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        Ok(archive_data)
    }
}
