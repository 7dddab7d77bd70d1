use reqwest::Client;
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::table::RawTable;

use super::loader::{load_nutrition, DuplicateCodePolicy, NutritionLayout, NutritionTable};

/// Where the composition table comes from. The rest of the pipeline only
/// sees the resolved `NutritionTable`.
#[derive(Debug, Clone, PartialEq)]
pub enum NutritionSource {
    RemoteUrl(String),
    /// A table supplied by the user alongside the consumption file.
    Upload(PathBuf),
    /// A fixed table shipped with the deployment.
    LocalPath(PathBuf),
}

impl NutritionSource {
    pub fn describe(&self) -> String {
        match self {
            NutritionSource::RemoteUrl(url) => format!("remote table at {}", url),
            NutritionSource::Upload(path) => format!("uploaded table {:?}", path),
            NutritionSource::LocalPath(path) => format!("local table {:?}", path),
        }
    }

    /// Fetches the raw bytes of the table. Any failure is reported as the
    /// nutrition input being unavailable.
    pub async fn resolve(&self) -> Result<Vec<u8>, PipelineError> {
        log::info!("Resolving nutrition table from {}", self.describe());
        let unavailable = |detail: String| {
            PipelineError::InputUnavailable(format!(
                "nutrition table ({}): {}",
                self.describe(),
                detail
            ))
        };

        match self {
            NutritionSource::RemoteUrl(url) => {
                let response = Client::new()
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(unavailable(format!("HTTP {}", response.status())));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            NutritionSource::Upload(path) | NutritionSource::LocalPath(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| unavailable(e.to_string()))
            }
        }
    }

    /// Resolves, parses and loads the table in one step.
    pub async fn load(
        &self,
        delimiter: u8,
        layout: &NutritionLayout,
        policy: DuplicateCodePolicy,
    ) -> Result<NutritionTable, PipelineError> {
        let bytes = self.resolve().await?;
        let raw = RawTable::from_bytes(&bytes, delimiter).map_err(|e| match e {
            PipelineError::Csv(err) => PipelineError::InputUnavailable(format!(
                "nutrition table ({}) could not be parsed: {}",
                self.describe(),
                err
            )),
            other => other,
        })?;
        load_nutrition(&raw, layout, policy)
    }

    /// Like `load`, but an unreachable or empty source yields `Ok(None)` so
    /// the pipeline can refuse to run on its own terms. A table that was
    /// obtained but is malformed is still an error.
    pub async fn load_optional(
        &self,
        delimiter: u8,
        layout: &NutritionLayout,
        policy: DuplicateCodePolicy,
    ) -> Result<Option<NutritionTable>, PipelineError> {
        match self.load(delimiter, layout, policy).await {
            Ok(table) => Ok(Some(table)),
            Err(e) if e.is_input_unavailable() => {
                log::error!("Failed to load the nutrition table: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
