//! Manifest loading.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, warn};

use vcomp_media::{probe_file, CompositionState};
use vcomp_models::{AssetRef, AssetSource, CompositionManifest};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Read a manifest and resolve its paths against the manifest's directory.
pub async fn load_manifest(path: &Path) -> anyhow::Result<CompositionManifest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest = CompositionManifest::from_json(&text)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(manifest.resolve_paths(base))
}

/// Load every asset the manifest names and build the composition.
///
/// With `ffprobe` set, metadata the manifest does not declare is filled in
/// by probing each file.
pub async fn build_state(
    manifest: CompositionManifest,
    ffprobe: Option<&Path>,
) -> anyhow::Result<CompositionState> {
    let main = load_asset(&manifest.main, ffprobe).await?;

    let mut prepend = Vec::with_capacity(manifest.prepend.len());
    for source in &manifest.prepend {
        prepend.push(load_asset(source, ffprobe).await?);
    }
    let mut append = Vec::with_capacity(manifest.append.len());
    for source in &manifest.append {
        append.push(load_asset(source, ffprobe).await?);
    }

    let mut state = CompositionState::new(main).prepend(prepend).append(append);
    for entry in manifest.overlays {
        let asset = load_asset(&entry.asset, ffprobe).await?;
        state = state.add_overlay(asset, entry.spec);
    }
    for fragment in manifest.custom_filters {
        state = state.set_custom_filter(fragment);
    }

    Ok(state.with_output(manifest.output))
}

async fn load_asset(source: &AssetSource, ffprobe: Option<&Path>) -> anyhow::Result<AssetRef> {
    let bytes = tokio::fs::read(&source.path)
        .await
        .with_context(|| format!("Failed to read asset {}", source.path.display()))?;

    let mut metadata = source.metadata.clone();
    if metadata.format.is_none() {
        metadata.format = source
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
    }

    if let Some(ffprobe) = ffprobe {
        match probe_file(ffprobe, &source.path, PROBE_TIMEOUT).await {
            Ok(probed) => {
                debug!(path = %source.path.display(), "Probed asset");
                metadata = metadata.merged_with(&probed);
            }
            Err(e) => warn!(
                "Could not probe {}, using declared metadata: {}",
                source.path.display(),
                e
            ),
        }
    }

    Ok(AssetRef::new(bytes, source.kind).with_metadata(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vcomp_models::AssetKind;

    #[tokio::test]
    async fn test_load_and_build() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("talk.mp4"), b"main").await.unwrap();
        tokio::fs::write(dir.path().join("logo.mov"), b"logo").await.unwrap();
        tokio::fs::write(dir.path().join("music.mp3"), b"music").await.unwrap();
        tokio::fs::write(
            dir.path().join("job.json"),
            r##"{
                "main": { "path": "talk.mp4", "metadata": { "width": 1280, "height": 720 } },
                "overlays": [
                    { "asset": { "path": "logo.mov" }, "position": "center", "opacity": 0.5 },
                    { "asset": { "path": "music.mp3", "kind": "audio" } }
                ],
                "custom_filters": ["[mixa]volume=0.5[quiet]"]
            }"##,
        )
        .await
        .unwrap();

        let manifest = load_manifest(&dir.path().join("job.json")).await.unwrap();
        let state = build_state(manifest, None).await.unwrap();

        assert_eq!(state.main().bytes(), b"main");
        assert_eq!(state.main().metadata().width, Some(1280));
        assert_eq!(state.main().extension(), "mp4");
        assert_eq!(state.overlays().len(), 2);
        assert_eq!(state.overlays()[0].asset.extension(), "mov");
        assert_eq!(state.overlays()[1].asset.kind(), AssetKind::Audio);
        assert_eq!(state.custom_filters().len(), 1);
        assert!(state.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_asset_names_the_file() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("job.json"), r#"{ "main": { "path": "gone.mp4" } }"#)
            .await
            .unwrap();

        let manifest = load_manifest(&dir.path().join("job.json")).await.unwrap();
        let err = build_state(manifest, None).await.unwrap_err();
        assert!(err.to_string().contains("gone.mp4"));
    }
}
