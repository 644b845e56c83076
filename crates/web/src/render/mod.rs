//! Template rendering drivers.
//!
//! A [`Driver`] renders named templates from a template directory. Drivers are
//! created by name through a [`DriverRegistry`], which maps each name to a
//! factory taking the template directory.
//!
//! [`Driver::render`] fails hard and returns the error, [`Driver::fetch`] never
//! fails: errors are rendered inline as `Parse <name> err: <cause>`.

mod jinja;
mod registry;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use micro_engine::Response;
use thiserror::Error;

pub use jinja::JinjaDriver;
pub use registry::{DriverFactory, DriverRegistry};

/// Helper values made visible to templates, usually functions built with
/// [`minijinja::Value::from_function`].
pub type FuncMap = BTreeMap<String, minijinja::Value>;

/// Rewrites a template name for the current render context.
pub type PathFixer = Arc<dyn Fn(&dyn RenderContext, &str) -> String + Send + Sync>;

/// Per render state a driver can draw on.
pub trait RenderContext: Send + Sync {
    /// Helpers scoped to this render, merged into the template variables.
    fn funcs(&self) -> FuncMap {
        FuncMap::new()
    }
}

impl RenderContext for () {}

impl RenderContext for FuncMap {
    fn funcs(&self) -> FuncMap {
        self.clone()
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("render driver {name} is not registered")]
    UnknownDriver { name: String },

    #[error("invalid template dir {}: {source}", dir.display())]
    TemplateDir { dir: PathBuf, source: io::Error },

    #[error("template name {name} is outside of the template dir")]
    InvalidPath { name: String },

    #[error("render io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("{operation} is unsupported")]
    Unsupported { operation: &'static str },
}

impl RenderError {
    pub fn template<S: ToString>(name: S, source: minijinja::Error) -> Self {
        Self::Template { name: name.to_string(), source }
    }

    pub fn unknown_driver<S: ToString>(name: S) -> Self {
        Self::UnknownDriver { name: name.to_string() }
    }

    pub fn invalid_path<S: ToString>(name: S) -> Self {
        Self::InvalidPath { name: name.to_string() }
    }

    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }
}

/// A template engine bound to one template directory.
///
/// Configuration methods take `&self`: a driver is shared between concurrent
/// renders and synchronises its own state. Everything but [`Driver::render`]
/// and [`Driver::tmpl_dir`] has a no-op default.
pub trait Driver: Send + Sync {
    fn render(
        &self,
        writer: &mut dyn io::Write,
        name: &str,
        data: &serde_json::Value,
        ctx: &dyn RenderContext,
    ) -> Result<(), RenderError>;

    /// Renders into a string; a failure becomes the text of the result,
    /// naming the template after [`Driver::template_name`].
    fn fetch(&self, name: &str, data: &serde_json::Value, ctx: &dyn RenderContext) -> String {
        let mut buf = Vec::new();
        match self.render(&mut buf, name, data, ctx) {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(e) => format!("Parse {} err: {e}", self.template_name(ctx, name)),
        }
    }

    /// The template `name` resolves to under `ctx`, once any path fixer ran.
    fn template_name(&self, _ctx: &dyn RenderContext, name: &str) -> String {
        name.to_string()
    }

    /// The unrendered source of a template.
    fn raw_content(&self, _name: &str) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::unsupported("raw content"))
    }

    /// Adds helpers visible to every template.
    fn set_func_map(&self, _funcs: FuncMap) {}

    /// Debug mode reloads templates on every render.
    fn set_debug(&self, _on: bool) {}

    fn debug(&self) -> bool {
        false
    }

    fn set_tmpl_path_fixer(&self, _fixer: PathFixer) {}

    fn clear_cache(&self) {}

    fn tmpl_dir(&self) -> &Path;
}

/// Renders `name` into `res` as an HTML page.
///
/// Nothing is written to `res` when rendering fails.
pub fn render_html(
    driver: &dyn Driver,
    res: &mut dyn Response,
    name: &str,
    data: &serde_json::Value,
    ctx: &dyn RenderContext,
) -> Result<(), RenderError> {
    let mut buf = Vec::new();
    driver.render(&mut buf, name, data, ctx)?;

    if !res.committed() {
        res.header_mut().set(CONTENT_TYPE.as_str(), "text/html; charset=utf-8");
    }
    res.write_all(&buf)?;
    Ok(())
}
