//! Command-line bridge
//!
//! Entry points of the `drawio-host` binary: a stdio webview server and two
//! file inspection commands built directly on the codecs.

pub mod server;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};

use crate::codec::DiagramFormat;
use crate::config::{Command, Config};
use crate::extension::{Extension, HostServices};

/// Run one parsed command
pub async fn run(config: Arc<Config>, command: Command) -> Result<()> {
    match command {
        Command::Serve { file } => {
            let extension = Extension::activate(config, HostServices::default()).await?;
            server::serve(&extension, &file).await
        }
        Command::Extract { file } => {
            let diagram = extract(&file).await?;
            println!("{}", diagram);
            Ok(())
        }
        Command::Check { file } => {
            check(&file).await?;
            println!("{}: ok", file.display());
            Ok(())
        }
    }
}

/// The diagram XML embedded in `file`
pub async fn extract(file: &Path) -> Result<String> {
    let (format, bytes) = read_diagram_file(file).await?;
    format
        .decode(&bytes)
        .with_context(|| format!("Failed to decode {}", file.display()))
}

/// Verify that `file` decodes and that an unedited save reproduces it byte for byte
pub async fn check(file: &Path) -> Result<()> {
    let (format, bytes) = read_diagram_file(file).await?;
    let diagram = format
        .decode(&bytes)
        .with_context(|| format!("Failed to decode {}", file.display()))?;
    let encoded = format
        .encode(&bytes, &diagram)
        .with_context(|| format!("Failed to encode {}", file.display()))?;

    if encoded != bytes {
        bail!("{} does not survive an unedited save", file.display());
    }
    if !bytes.is_empty() && format.decode(&encoded)? != diagram {
        bail!("{} decodes differently after saving", file.display());
    }
    Ok(())
}

async fn read_diagram_file(file: &Path) -> Result<(DiagramFormat, Vec<u8>)> {
    let format = DiagramFormat::from_path(file)
        .ok_or_else(|| anyhow!("{} is not a draw.io file", file.display()))?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok((format, bytes))
}
