use crate::context::ContextBuilder;
use crate::dockerfile::{LanguageSpec, generate_dockerfile};
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};

/// 言語指定からイメージを作るビルダー
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// `tag` でイメージをビルドする。成功時はそのタグで参照できる状態になる
    async fn build(&self, spec: &LanguageSpec, tag: &str) -> BuildResult<()>;
}

/// Docker Engine でビルドする ImageBuilder
#[derive(Clone)]
pub struct DockerImageBuilder {
    docker: Docker,
    verbose: bool,
}

impl DockerImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            verbose: false,
        }
    }

    /// ビルド出力を debug ログに流す（開発モード）
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// ビルド出力の1メッセージを処理する
///
/// エラーは `BuildFailed`。`verbose` のときは出力を debug ログに流す。
fn handle_build_output(output: bollard::models::BuildInfo, verbose: bool) -> BuildResult<()> {
    if let Some(error) = output.error {
        return Err(BuildError::BuildFailed(error));
    }

    if let Some(error_detail) = output.error_detail {
        let error_msg = error_detail
            .message
            .unwrap_or_else(|| "Unknown build error".to_string());
        return Err(BuildError::BuildFailed(error_msg));
    }

    if verbose {
        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::debug!(target: "weaver_build::output", "{}", line);
            }
        }
        if let Some(status) = output.status {
            tracing::debug!(target: "weaver_build::output", "{}", status);
        }
    }

    Ok(())
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    async fn build(&self, spec: &LanguageSpec, tag: &str) -> BuildResult<()> {
        if tag.is_empty() {
            return Err(BuildError::InvalidConfig("image tag is empty".to_string()));
        }

        tracing::info!(tag, language = %spec.language, "Building image");

        let dockerfile = generate_dockerfile(spec);
        tracing::debug!("Generated Dockerfile:\n{}", dockerfile);
        let context = ContextBuilder::from_dockerfile(&dockerfile)?;

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            pull: true,
            q: !self.verbose,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(context));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => handle_build_output(output, self.verbose)?,
                Err(bollard::errors::Error::DockerStreamError { error }) => {
                    return Err(BuildError::BuildFailed(error));
                }
                Err(e) => return Err(BuildError::DockerConnection(e)),
            }
        }

        tracing::info!(tag, "Successfully built image");
        Ok(())
    }
}
