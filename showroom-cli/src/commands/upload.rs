//! `showroom upload <image>` — push one image to the CDN.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use showroom_store::UploadSink;

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Image file to upload.
    pub image: PathBuf,
}

impl UploadArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = showroom_core::config::load_at(&home).context("failed to load showroom config")?;
        let settings = config
            .upload
            .as_ref()
            .context("no `upload` endpoint configured in config.yaml")?;
        let sink = UploadSink::new(settings)?;

        let name = self
            .image
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("'{}' has no usable file name", self.image.display()))?
            .to_string();
        let bytes = std::fs::read(&self.image)
            .with_context(|| format!("cannot read '{}'", self.image.display()))?;

        let uploaded = super::runtime()?
            .block_on(sink.upload(&name, &bytes))
            .with_context(|| format!("upload of '{name}' failed"))?;
        println!("✓ Uploaded {name}");
        println!("  URL: {}", uploaded.secure_url);
        println!("  Public id: {}", uploaded.public_id);
        Ok(())
    }
}
