use std::path::Path;

use serde::Deserialize;

use crate::error::ArtifactError;

/// Bundled model description: fixed input shape and the class table.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub input: InputShape,
    pub classes: Vec<ClassSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassSpec {
    pub identifier: String,
    /// Reference colour used by [`PrototypeEngine`](super::PrototypeEngine).
    #[serde(default)]
    pub prototype: Option<[u8; 3]>,
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::Missing(path.to_path_buf()));
        }
        let raw =
            std::fs::read(path).map_err(|e| ArtifactError::Read(e, path.to_path_buf()))?;
        let artifact = Self::from_slice(&raw)?;
        tracing::info!(
            "Loaded model '{}' ({}x{}, {} classes) from {}",
            artifact.name,
            artifact.input.width,
            artifact.input.height,
            artifact.classes.len(),
            path.display()
        );
        Ok(artifact)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, ArtifactError> {
        let artifact: ModelArtifact = serde_json::from_slice(raw)?;
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.input.width == 0 || self.input.height == 0 {
            return Err(ArtifactError::Invalid(format!(
                "input shape {}x{} has a zero dimension",
                self.input.width, self.input.height
            )));
        }

        if self.classes.is_empty() {
            return Err(ArtifactError::Invalid("no classes defined".to_string()));
        }

        if let Some(index) = self
            .classes
            .iter()
            .position(|class| class.identifier.trim().is_empty())
        {
            return Err(ArtifactError::Invalid(format!(
                "class {} has an empty identifier",
                index
            )));
        }

        Ok(())
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}
