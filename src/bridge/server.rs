//! Stdio webview bridge.
//!
//! Runs one editor and speaks the webview protocol as JSON lines: webview
//! messages are read from stdin, host messages are written to stdout. Logs go
//! to stderr. The process ends once stdin closes and the editor has shut down.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::extension::Extension;
use crate::webview::{self, HostMessage, WebviewMessage};

/// Serve `file` over the process's stdin and stdout
pub async fn serve(extension: &Extension, file: &Path) -> Result<()> {
    serve_with(
        extension,
        file,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Serve `file` over arbitrary streams
pub async fn serve_with<R, W>(
    extension: &Extension,
    file: &Path,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, peer) = webview::channel();
    let editor = extension
        .open(file, handle)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    log::info!("Serving {} as editor {}", file.display(), editor.id());

    let (from_host, to_host) = peer.into_parts();
    let writer = tokio::spawn(write_messages(from_host, output));

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WebviewMessage>(line) {
            Ok(message) => {
                if to_host.send(message).is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("Ignoring malformed webview message: {}", e),
        }
    }

    drop(to_host);
    editor.closed().await;
    writer.await.context("Writer task panicked")??;
    log::info!("Editor {} closed", editor.id());
    Ok(())
}

async fn write_messages<W>(
    mut from_host: mpsc::UnboundedReceiver<HostMessage>,
    mut output: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = from_host.recv().await {
        let mut line = serde_json::to_vec(&message).context("Failed to encode host message")?;
        line.push(b'\n');
        output.write_all(&line).await.context("Failed to write stdout")?;
        output.flush().await.context("Failed to flush stdout")?;
    }
    Ok(())
}
