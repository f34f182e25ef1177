//! HTML shell for every non-API path. Rendering proper lives behind
//! [`PageRenderer`]; this module only splices its output into `index.html`.

use std::{future::Future, path::PathBuf, sync::Arc};

use axum::{extract::Extension, http::Uri, response::Html};

use crate::error::AppResult;

const HEAD_SLOT: &str = "<!--app-head-->";
const HTML_SLOT: &str = "<!--app-html-->";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub head: Option<String>,
}

pub trait PageRenderer: Send + Sync {
    fn render(&self, path: &str) -> impl Future<Output = Rendered> + Send;
}

/// No server-side rendering: an empty mount point the client app fills in.
#[derive(Debug, Default, Clone, Copy)]
pub struct MountPoint;

impl PageRenderer for MountPoint {
    async fn render(&self, _path: &str) -> Rendered {
        Rendered { html: r#"<div id="app"></div>"#.into(), head: None }
    }
}

#[derive(Debug)]
pub struct PageShell<R = MountPoint> {
    template: PathBuf,
    renderer: R,
}

impl PageShell {
    pub fn new(static_dir: impl Into<PathBuf>) -> Self {
        Self::with_renderer(static_dir, MountPoint)
    }
}

impl<R: PageRenderer> PageShell<R> {
    pub fn with_renderer(static_dir: impl Into<PathBuf>, renderer: R) -> Self {
        Self { template: static_dir.into().join("index.html"), renderer }
    }

    /// Template is re-read per request so edits show up without a restart.
    pub async fn page(&self, path: &str) -> AppResult<String> {
        let template = tokio::fs::read_to_string(&self.template).await?;
        let rendered = self.renderer.render(path).await;
        Ok(splice(&template, &rendered))
    }
}

pub fn splice(template: &str, rendered: &Rendered) -> String {
    template
        .replacen(HEAD_SLOT, rendered.head.as_deref().unwrap_or(""), 1)
        .replacen(HTML_SLOT, &rendered.html, 1)
}

pub async fn render_page(
    Extension(shell): Extension<Arc<PageShell>>,
    uri: Uri,
) -> AppResult<Html<String>> {
    shell.page(uri.path()).await.map(Html)
}
