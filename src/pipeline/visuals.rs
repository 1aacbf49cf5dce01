//! Visuals stage (spec §4.5 "Visuals"): one image per logical scene, scene
//! count derived from script structure.

use std::path::{Path, PathBuf};

use crate::domain::brief::AspectRatio;
use crate::pipeline::script::scene_count;
use crate::providers::VisualsProvider;

pub async fn run(
    provider: &dyn VisualsProvider,
    raw_script: &str,
    prompt: &str,
    aspect: AspectRatio,
    out_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let count = scene_count(raw_script);
    let paths = provider.generate(prompt, aspect, count, out_dir).await?;
    if paths.is_empty() {
        anyhow::bail!("visuals provider returned zero images for {count} scene(s)");
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::visuals::SlideshowVisuals;
    use tempfile::tempdir;

    #[tokio::test]
    async fn produces_one_image_per_scene() {
        let dir = tempdir().unwrap();
        let raw = "# Scene A\ntext\n# Scene B\ntext\n# Scene C\ntext";
        let paths = run(
            &SlideshowVisuals,
            raw,
            "a prompt",
            AspectRatio::Widescreen,
            dir.path(),
        )
        .await
        .unwrap();
        assert_eq!(paths.len(), 3);
    }
}
