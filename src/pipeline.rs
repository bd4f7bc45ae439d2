//! The merge pipeline: intake, ordering, merging, normalization and
//! retention scheduling for one request.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{PrintMergeError, Result};
use crate::intake::{self, RawUpload, UploadLimits};
use crate::merge::{MIN_MERGE_INPUTS, MergedArtifact, Merger};
use crate::normalize::PrintNormalizer;
use crate::order::{self, OrderPolicy};
use crate::retention::{ResourceKind, RetentionPolicy, RetentionQueue};
use crate::session::{SessionStore, UploadSession};

/// One merge request as received from a client.
#[derive(Debug, Clone, Default)]
pub struct MergeRequest {
    /// Uploaded files, in upload order.
    pub uploads: Vec<RawUpload>,
    /// Requested file name order, if the client sent one.
    pub order: Option<Vec<String>>,
}

/// Runs merge requests from upload to scheduled cleanup.
#[derive(Debug, Clone)]
pub struct MergePipeline {
    store: SessionStore,
    outputs_dir: PathBuf,
    limits: UploadLimits,
    order_policy: OrderPolicy,
    merger: Merger,
    normalizer: PrintNormalizer,
    retention: Arc<RetentionQueue>,
    policy: RetentionPolicy,
}

impl MergePipeline {
    /// Build a pipeline from `config`, scheduling cleanups on `retention`.
    pub fn new(config: &Config, retention: Arc<RetentionQueue>) -> Self {
        Self {
            store: SessionStore::new(&config.uploads_dir),
            outputs_dir: config.outputs_dir.clone(),
            limits: config.limits,
            order_policy: config.order_policy,
            merger: Merger::new(config.effective_jobs()),
            normalizer: PrintNormalizer::default(),
            retention,
            policy: config.retention,
        }
    }

    /// Directory merged artifacts are written to.
    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// Upload size limits enforced by this pipeline.
    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Queue the pipeline schedules deletions on.
    pub fn retention(&self) -> &Arc<RetentionQueue> {
        &self.retention
    }

    /// Create the uploads root and the outputs directory.
    pub async fn ensure_dirs(&self) -> Result<()> {
        self.store.ensure_root().await?;
        tokio::fs::create_dir_all(&self.outputs_dir)
            .await
            .map_err(|e| PrintMergeError::storage("creating the outputs directory", e))
    }

    /// Run one request.
    ///
    /// Requests with fewer than two files, or with any file of an
    /// unsupported type or size, are rejected before anything is written.
    /// Once a session exists its directory is always scheduled for
    /// deletion, whether the merge succeeds or not.
    ///
    /// A failed print normalization does not fail the request: the merged
    /// document is kept as is and reported with `normalized: false`.
    #[tracing::instrument(skip_all, fields(files = request.uploads.len()))]
    pub async fn run(&self, request: MergeRequest) -> Result<MergedArtifact> {
        self.precheck(&request.uploads)?;

        let mut session = self.store.create_session().await?;
        let result = self.process(&mut session, request).await;
        let now = Utc::now();

        self.retention
            .schedule(
                ResourceKind::SessionDir,
                session.root.clone(),
                now + self.policy.session,
            )
            .await;

        match result {
            Ok(artifact) => {
                self.retention
                    .schedule(
                        ResourceKind::Artifact,
                        artifact.path.clone(),
                        now + self.policy.artifact,
                    )
                    .await;
                tracing::info!(
                    session = %session.id,
                    file = %artifact.file_name,
                    pages = artifact.page_count,
                    normalized = artifact.normalized,
                    "Merge request completed"
                );
                Ok(artifact)
            }
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "Merge request failed");
                Err(e)
            }
        }
    }

    /// Validation that needs no I/O.
    fn precheck(&self, uploads: &[RawUpload]) -> Result<()> {
        if uploads.is_empty() {
            return Err(PrintMergeError::NoFiles);
        }
        if uploads.len() < MIN_MERGE_INPUTS {
            return Err(PrintMergeError::InsufficientInput {
                count: uploads.len(),
            });
        }

        let mut request_bytes = 0_u64;
        for upload in uploads {
            intake::classify(&upload.file_name, upload.content_type.as_deref())?;
            let size = upload.data.len() as u64;
            request_bytes = request_bytes.saturating_add(size);
            self.limits.check(&upload.file_name, size, request_bytes)?;
        }
        Ok(())
    }

    async fn process(
        &self,
        session: &mut UploadSession,
        request: MergeRequest,
    ) -> Result<MergedArtifact> {
        for upload in request.uploads {
            intake::accept_upload(session, upload, &self.limits).await?;
        }

        let ordered = order::reconcile(
            session.files.clone(),
            request.order.as_deref(),
            self.order_policy,
        )?;

        let mut artifact = self.merger.merge(&ordered, &self.outputs_dir).await?;

        match self.normalizer.normalize(&artifact.path).await {
            Ok(report) => {
                artifact.pages = report.pages;
                artifact.normalized = true;
            }
            Err(e) => {
                tracing::warn!(
                    file = %artifact.file_name,
                    error = %e,
                    "Print normalization failed, keeping the merged document as is"
                );
            }
        }

        Ok(artifact)
    }
}
