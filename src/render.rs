//! Applet rendering seams.
//!
//! A channel turns an applet into a frame in two steps: the [`Renderer`]
//! runs the app with its key/value configuration and yields drawable
//! [`Root`]s, then the [`Encoder`] compresses those roots into the image
//! bytes sent to devices. Both are traits so the hub can be driven by a
//! real scripting runtime in production and by fakes in tests.
//!
//! The built-in pair ([`StaticImageRenderer`] + [`PassthroughEncoder`])
//! serves pre-rendered images shipped inside app bundles.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::catalog::Manifest;

/// One drawable output of an applet run, opaque to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root(pub Bytes);

/// Reasons an applet produced no frame this tick.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The bundle could not be loaded.
    #[error("applet failed to load: {0}")]
    Load(String),
    /// The applet ran and failed.
    #[error("applet failed: {0}")]
    Execute(String),
    /// The roots could not be encoded within the size limit.
    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Runs an app bundle with a configuration.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Execute `manifest`'s bundle with `config`.
    ///
    /// An empty result is valid and means "nothing to show".
    async fn run(
        &self,
        manifest: &Manifest,
        config: &HashMap<String, String>,
    ) -> Result<Vec<Root>, RenderError>;
}

/// Turns roots into image bytes.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode `roots` into at most `size_limit` bytes.
    async fn encode(&self, roots: &[Root], size_limit: usize) -> Result<Bytes, RenderError>;
}

/// Serves the image named by the manifest's `image` field.
///
/// A configuration key `image` overrides the manifest, which lets one app
/// bundle carry several pictures.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticImageRenderer;

#[async_trait]
impl Renderer for StaticImageRenderer {
    async fn run(
        &self,
        manifest: &Manifest,
        config: &HashMap<String, String>,
    ) -> Result<Vec<Root>, RenderError> {
        let Some(name) = config.get("image").or(manifest.image.as_ref()) else {
            return Ok(Vec::new());
        };
        // Keep lookups inside the bundle.
        if name.contains("..") || name.starts_with('/') {
            return Err(RenderError::Execute(format!("image path {name} escapes bundle")));
        }

        let path = manifest.bundle.join(name);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| RenderError::Load(format!("{}: {}", path.display(), e)))?;
        Ok(vec![Root(Bytes::from(data))])
    }
}

/// Sends the first root unchanged, enforcing the size limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughEncoder;

#[async_trait]
impl Encoder for PassthroughEncoder {
    async fn encode(&self, roots: &[Root], size_limit: usize) -> Result<Bytes, RenderError> {
        let root = roots
            .first()
            .ok_or_else(|| RenderError::Encode("no roots".to_string()))?;
        if root.0.len() > size_limit {
            return Err(RenderError::Encode(format!(
                "image is {} bytes, limit {}",
                root.0.len(),
                size_limit
            )));
        }
        Ok(root.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(bundle: &std::path::Path, image: Option<&str>) -> Manifest {
        Manifest {
            id: "pic".to_string(),
            name: "Picture".to_string(),
            summary: String::new(),
            desc: String::new(),
            author: String::new(),
            image: image.map(str::to_string),
            bundle: bundle.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_static_image_round() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.webp"), b"RIFFaaaa").unwrap();
        std::fs::write(tmp.path().join("b.webp"), b"RIFFbbbbbb").unwrap();
        let manifest = manifest(tmp.path(), Some("a.webp"));

        let roots = StaticImageRenderer
            .run(&manifest, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(roots, vec![Root(Bytes::from_static(b"RIFFaaaa"))]);

        let config = HashMap::from([("image".to_string(), "b.webp".to_string())]);
        let roots = StaticImageRenderer.run(&manifest, &config).await.unwrap();
        let image = PassthroughEncoder.encode(&roots, 100).await.unwrap();
        assert_eq!(&image[..], b"RIFFbbbbbb");
    }

    #[tokio::test]
    async fn test_static_image_failures() {
        let tmp = TempDir::new().unwrap();

        let none = StaticImageRenderer
            .run(&manifest(tmp.path(), None), &HashMap::new())
            .await
            .unwrap();
        assert!(none.is_empty());

        let missing = StaticImageRenderer
            .run(&manifest(tmp.path(), Some("gone.webp")), &HashMap::new())
            .await;
        assert!(matches!(missing, Err(RenderError::Load(_))));

        let escape = StaticImageRenderer
            .run(&manifest(tmp.path(), Some("../secret")), &HashMap::new())
            .await;
        assert!(matches!(escape, Err(RenderError::Execute(_))));
    }

    #[tokio::test]
    async fn test_encoder_enforces_limit() {
        let roots = vec![Root(Bytes::from(vec![0u8; 32]))];
        assert!(PassthroughEncoder.encode(&roots, 32).await.is_ok());
        assert!(matches!(
            PassthroughEncoder.encode(&roots, 31).await,
            Err(RenderError::Encode(_))
        ));
        assert!(PassthroughEncoder.encode(&[], 32).await.is_err());
    }
}
