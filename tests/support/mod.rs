//! Shared fixtures: a scripted webview and sample diagram files
#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use drawio_host::codec::{DiagramFormat, ExportFormat, png, svg};
use drawio_host::config::{Config, Settings, Theme};
use drawio_host::editor::{DrawioEditor, Lifecycle};
use drawio_host::extension::{Extension, HostServices};
use drawio_host::webview::protocol::data_url;
use drawio_host::webview::{HostMessage, RequestId, WebviewMessage, WebviewPeer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DIAGRAM: &str = "<mxfile host=\"test\"><diagram id=\"a\" name=\"Page-1\">\
    <mxGraphModel><root><mxCell id=\"0\"/><mxCell id=\"1\" parent=\"0\"/>\
    <mxCell id=\"2\" value=\"Start &amp; end\" vertex=\"1\" parent=\"1\"/></root>\
    </mxGraphModel></diagram></mxfile>";

pub const EDITED: &str = "<mxfile host=\"test\"><diagram id=\"a\" name=\"Page-1\">\
    <mxGraphModel><root><mxCell id=\"0\"/><mxCell id=\"1\" parent=\"0\"/></root>\
    </mxGraphModel></diagram></mxfile>";

pub const BLANK_SVG: &str =
    "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"120px\" height=\"60px\"><rect/></svg>";

pub fn blank_png() -> Vec<u8> {
    let mut image = png::SIGNATURE.to_vec();
    png::write_chunk(&mut image, b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
    png::write_chunk(&mut image, b"IDAT", &[0x78, 0x9c, 0x63, 0x00, 0x00, 0x00, 0x01, 0x00]);
    png::write_chunk(&mut image, b"IEND", &[]);
    image
}

/// File bytes of `diagram` stored as `format`
pub fn file_bytes(format: DiagramFormat, diagram: &str) -> Vec<u8> {
    match format {
        DiagramFormat::Drawio => diagram.as_bytes().to_vec(),
        DiagramFormat::DrawioSvg => svg::encode(BLANK_SVG.as_bytes(), diagram).unwrap(),
        DiagramFormat::DrawioPng => png::encode(&blank_png(), diagram).unwrap(),
    }
}

pub fn write_diagram(dir: &Path, name: &str, diagram: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let format = DiagramFormat::from_path(&path).unwrap();
    std::fs::write(&path, file_bytes(format, diagram)).unwrap();
    path
}

/// Settings for tests: no periodic backups, backups under `dir`
pub fn settings(dir: &Path) -> Settings {
    Settings {
        backup_interval_secs: 0,
        backup_dir: Some(dir.join("backups")),
        ..Settings::default()
    }
}

pub async fn extension(settings: Settings) -> Extension {
    extension_with(settings, HostServices::default()).await
}

pub async fn extension_with(settings: Settings, services: HostServices) -> Extension {
    Extension::activate(Arc::new(Config::with_settings(settings)), services)
        .await
        .unwrap()
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let wait = async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("condition not reached in time");
}

/// Wait until the editor saw `ready` and the fake received its first `load`
pub async fn wait_ready(editor: &DrawioEditor, fake: &FakeWebview) {
    eventually(|| async {
        editor.lifecycle().await != Lifecycle::Opening && fake.loads() > 0
    })
    .await;
}

#[derive(Debug, Default)]
pub struct FakeState {
    /// What the embedded tool currently shows
    pub diagram: String,
    /// Answer `getContent` requests; unanswered ids are kept in `held`
    pub silent: bool,
    pub held: Vec<RequestId>,
    /// Answer `convert` and `export` requests with this error
    pub failure: Option<String>,
    pub received: Vec<HostMessage>,
}

/// Stand-in for the embedded diagram tool
pub struct FakeWebview {
    pub state: Arc<Mutex<FakeState>>,
    to_host: mpsc::UnboundedSender<WebviewMessage>,
    task: JoinHandle<()>,
}

impl FakeWebview {
    /// Start answering `peer`; reports ready right away
    pub fn spawn(peer: WebviewPeer) -> Self {
        let (mut from_host, to_host) = peer.into_parts();
        let state = Arc::new(Mutex::new(FakeState::default()));
        let _ = to_host.send(WebviewMessage::Ready);

        let task = {
            let state = state.clone();
            let to_host = to_host.clone();
            tokio::spawn(async move {
                while let Some(message) = from_host.recv().await {
                    let reply = {
                        let mut state = state.lock().unwrap();
                        state.received.push(message.clone());
                        respond(&mut state, message)
                    };
                    if let Some(reply) = reply {
                        let _ = to_host.send(reply);
                    }
                }
            })
        };

        Self {
            state,
            to_host,
            task,
        }
    }

    /// The user edits the diagram; the tool autosaves it to the host
    pub fn edit(&self, diagram: &str) {
        self.state.lock().unwrap().diagram = diagram.to_string();
        self.send(WebviewMessage::Autosave {
            content: diagram.to_string(),
        });
    }

    pub fn send(&self, message: WebviewMessage) {
        let _ = self.to_host.send(message);
    }

    pub fn set_silent(&self, silent: bool) {
        self.state.lock().unwrap().silent = silent;
    }

    pub fn held(&self) -> Vec<RequestId> {
        self.state.lock().unwrap().held.clone()
    }

    pub fn diagram(&self) -> String {
        self.state.lock().unwrap().diagram.clone()
    }

    pub fn received(&self) -> Vec<HostMessage> {
        self.state.lock().unwrap().received.clone()
    }

    /// Every theme pushed with `setTheme`, in order
    pub fn themes(&self) -> Vec<Theme> {
        self.received()
            .into_iter()
            .filter_map(|message| match message {
                HostMessage::SetTheme { theme } => Some(theme),
                _ => None,
            })
            .collect()
    }

    pub fn loads(&self) -> usize {
        self.received()
            .iter()
            .filter(|message| matches!(message, HostMessage::Load { .. }))
            .count()
    }

    /// The panel goes away
    pub fn close(self) {
        self.task.abort();
    }
}

fn respond(state: &mut FakeState, message: HostMessage) -> Option<WebviewMessage> {
    match message {
        HostMessage::Load { content, .. } => {
            state.diagram = content;
            None
        }
        HostMessage::GetContent { request_id } if state.silent => {
            state.held.push(request_id);
            None
        }
        HostMessage::GetContent { request_id } => Some(WebviewMessage::Content {
            request_id,
            content: state.diagram.clone(),
        }),
        HostMessage::Convert { request_id, .. } | HostMessage::Export { request_id, .. }
            if state.failure.is_some() =>
        {
            Some(WebviewMessage::Error {
                request_id: Some(request_id),
                message: state.failure.clone().unwrap_or_default(),
            })
        }
        HostMessage::Convert { request_id, format } => Some(WebviewMessage::ConvertResult {
            request_id,
            content: match format {
                DiagramFormat::Drawio => state.diagram.clone(),
                DiagramFormat::DrawioSvg => BLANK_SVG.to_string(),
                DiagramFormat::DrawioPng => data_url("image/png", &blank_png()),
            },
        }),
        HostMessage::Export { request_id, format } => Some(WebviewMessage::ExportResult {
            request_id,
            content: match format {
                ExportFormat::Svg => BLANK_SVG.to_string(),
                ExportFormat::Png => data_url("image/png", &blank_png()),
                ExportFormat::Drawio => state.diagram.clone(),
            },
        }),
        _ => None,
    }
}
