//! The `jinja` render driver, backed by minijinja.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use arc_swap::ArcSwap;
use minijinja::{path_loader, Environment, Value};
use tracing::debug;

use crate::render::{Driver, FuncMap, PathFixer, RenderContext, RenderError};

#[derive(Clone, Default)]
struct Settings {
    debug: bool,
    funcs: FuncMap,
    path_fixer: Option<PathFixer>,
}

/// Renders minijinja templates loaded from a directory.
///
/// Compiled templates are cached until [`Driver::clear_cache`]. In debug mode
/// every render builds a fresh environment, so template edits show up at
/// once. Template variables are the context helpers overlaid with the fields
/// of the data object; data that is not an object is exposed as `data`.
pub struct JinjaDriver {
    tmpl_dir: PathBuf,
    env: RwLock<Environment<'static>>,
    settings: ArcSwap<Settings>,
}

impl JinjaDriver {
    pub fn new<P: AsRef<Path>>(tmpl_dir: P) -> Result<Self, RenderError> {
        let dir = tmpl_dir.as_ref();
        let tmpl_dir =
            std::path::absolute(dir).map_err(|source| RenderError::TemplateDir { dir: dir.to_path_buf(), source })?;

        let env = build_env(&tmpl_dir, &FuncMap::new());
        Ok(Self { tmpl_dir, env: RwLock::new(env), settings: ArcSwap::from_pointee(Settings::default()) })
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings, &mut Environment<'static>),
    {
        let mut env = self.env.write().unwrap_or_else(PoisonError::into_inner);
        let mut settings = Settings::clone(&self.settings.load());
        f(&mut settings, &mut env);
        self.settings.store(Arc::new(settings));
    }
}

impl Driver for JinjaDriver {
    fn render(
        &self,
        writer: &mut dyn io::Write,
        name: &str,
        data: &serde_json::Value,
        ctx: &dyn RenderContext,
    ) -> Result<(), RenderError> {
        let env = self.env.read().unwrap_or_else(PoisonError::into_inner);
        let settings = self.settings.load();

        let name = fix_name(&settings, ctx, name);
        let vars = template_vars(data, ctx);

        if settings.debug {
            let fresh = build_env(&self.tmpl_dir, &settings.funcs);
            return execute(&fresh, &name, &vars, writer);
        }
        execute(&env, &name, &vars, writer)
    }

    fn raw_content(&self, name: &str) -> Result<Vec<u8>, RenderError> {
        let path = Path::new(name);
        if path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(RenderError::invalid_path(name));
        }
        Ok(fs::read(self.tmpl_dir.join(path))?)
    }

    fn template_name(&self, ctx: &dyn RenderContext, name: &str) -> String {
        fix_name(&self.settings.load(), ctx, name)
    }

    fn set_func_map(&self, funcs: FuncMap) {
        self.update(|settings, env| {
            for (name, value) in funcs {
                env.add_global(name.clone(), value.clone());
                settings.funcs.insert(name, value);
            }
        });
    }

    fn set_debug(&self, on: bool) {
        debug!(debug = on, tmpl_dir = %self.tmpl_dir.display(), "switch jinja debug mode");
        self.update(|settings, env| {
            settings.debug = on;
            env.clear_templates();
        });
    }

    fn debug(&self) -> bool {
        self.settings.load().debug
    }

    fn set_tmpl_path_fixer(&self, fixer: PathFixer) {
        self.update(|settings, _| settings.path_fixer = Some(fixer));
    }

    fn clear_cache(&self) {
        self.update(|_, env| env.clear_templates());
    }

    fn tmpl_dir(&self) -> &Path {
        &self.tmpl_dir
    }
}

impl fmt::Debug for JinjaDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JinjaDriver").field("tmpl_dir", &self.tmpl_dir).field("debug", &self.debug()).finish()
    }
}

fn build_env(tmpl_dir: &Path, funcs: &FuncMap) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(path_loader(tmpl_dir.to_path_buf()));
    for (name, value) in funcs {
        env.add_global(name.clone(), value.clone());
    }
    env
}

fn fix_name(settings: &Settings, ctx: &dyn RenderContext, name: &str) -> String {
    match &settings.path_fixer {
        Some(fixer) => fixer(ctx, name),
        None => name.to_string(),
    }
}

fn template_vars(data: &serde_json::Value, ctx: &dyn RenderContext) -> BTreeMap<String, Value> {
    let mut vars = ctx.funcs();
    match data {
        serde_json::Value::Object(fields) => {
            for (name, value) in fields {
                vars.insert(name.clone(), Value::from_serialize(value));
            }
        }
        serde_json::Value::Null => {}
        data => {
            vars.insert("data".to_string(), Value::from_serialize(data));
        }
    }
    vars
}

fn execute(
    env: &Environment<'_>,
    name: &str,
    vars: &BTreeMap<String, Value>,
    writer: &mut dyn io::Write,
) -> Result<(), RenderError> {
    let template = env.get_template(name).map_err(|e| RenderError::template(name, e))?;
    let output = template.render(vars).map_err(|e| RenderError::template(name, e))?;
    writer.write_all(output.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use tempfile::TempDir;

    fn templates(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn render(driver: &JinjaDriver, name: &str, data: serde_json::Value, ctx: &dyn RenderContext) -> String {
        let mut buf = Vec::new();
        driver.render(&mut buf, name, &data, ctx).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn render_with_data_and_helpers() {
        let dir = templates(&[("hello.txt", "{{ greet(name) }} {{ shout(\"hi\") }} {{ \"no data\" if data is undefined }}")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();
        driver.set_func_map(FuncMap::from([(
            "shout".to_string(),
            Value::from_function(|s: String| s.to_uppercase()),
        )]));

        let ctx = FuncMap::from([("greet".to_string(), Value::from_function(|name: String| format!("Hello {name}!")))]);
        assert_eq!(render(&driver, "hello.txt", json!({"name": "Bob"}), &ctx), "Hello Bob! HI no data");
    }

    #[test]
    fn non_object_data_is_exposed_as_data() {
        let dir = templates(&[("list.txt", "{% for x in data %}{{ x }},{% endfor %}")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();

        assert_eq!(render(&driver, "list.txt", json!([1, 2, 3]), &()), "1,2,3,");
    }

    #[test]
    fn render_errors() {
        let dir = templates(&[("bad.txt", "{% if %}")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();
        let mut buf = Vec::new();

        let result = driver.render(&mut buf, "bad.txt", &json!({}), &());
        assert!(matches!(result, Err(RenderError::Template { name, .. }) if name == "bad.txt"));

        let result = driver.render(&mut buf, "missing.txt", &json!({}), &());
        assert!(matches!(result, Err(RenderError::Template { .. })));
    }

    #[test]
    fn fetch_unparsable_template() {
        let dir = templates(&[("bad.txt", "{% if %}")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();

        let text = driver.fetch("bad.txt", &json!({}), &());
        assert!(text.starts_with("Parse bad.txt err: "), "{text}");
    }

    #[test]
    fn cache_until_debug() {
        let dir = templates(&[("page.txt", "v1")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();
        assert_eq!(render(&driver, "page.txt", json!(null), &()), "v1");

        fs::write(dir.path().join("page.txt"), "v2").unwrap();
        assert_eq!(render(&driver, "page.txt", json!(null), &()), "v1");

        driver.set_debug(true);
        assert!(driver.debug());
        assert_eq!(render(&driver, "page.txt", json!(null), &()), "v2");

        fs::write(dir.path().join("page.txt"), "v3").unwrap();
        assert_eq!(render(&driver, "page.txt", json!(null), &()), "v3");

        driver.set_debug(false);
        assert_eq!(render(&driver, "page.txt", json!(null), &()), "v3");

        fs::write(dir.path().join("page.txt"), "v4").unwrap();
        assert_eq!(render(&driver, "page.txt", json!(null), &()), "v3");
        driver.clear_cache();
        assert_eq!(render(&driver, "page.txt", json!(null), &()), "v4");
    }

    #[test]
    fn path_fixer_rewrites_names() {
        let dir = templates(&[("index.txt", "desktop"), ("mobile/index.txt", "mobile")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();
        assert_eq!(render(&driver, "index.txt", json!(null), &()), "desktop");

        driver.set_tmpl_path_fixer(Arc::new(|_ctx: &dyn RenderContext, name: &str| format!("mobile/{name}")));
        assert_eq!(render(&driver, "index.txt", json!(null), &()), "mobile");
    }

    #[test]
    fn fetch_names_the_fixed_template() {
        let dir = templates(&[("mobile/broken.txt", "{% for %}")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();
        driver.set_tmpl_path_fixer(Arc::new(|_ctx: &dyn RenderContext, name: &str| format!("mobile/{name}")));

        assert_eq!(driver.template_name(&(), "broken.txt"), "mobile/broken.txt");
        let text = driver.fetch("broken.txt", &json!({}), &());
        assert!(text.starts_with("Parse mobile/broken.txt err: "), "{text}");
    }

    #[test]
    fn raw_content_stays_in_template_dir() {
        let dir = templates(&[("raw.txt", "{{ not rendered }}")]);
        let driver = JinjaDriver::new(dir.path()).unwrap();

        assert_eq!(driver.raw_content("raw.txt").unwrap(), b"{{ not rendered }}");
        assert!(matches!(driver.raw_content("../secret"), Err(RenderError::InvalidPath { .. })));
        assert!(matches!(driver.raw_content("/etc/passwd"), Err(RenderError::InvalidPath { .. })));
        assert!(matches!(driver.raw_content("nope.txt"), Err(RenderError::Io { .. })));
    }

    #[test]
    fn relative_dir_is_made_absolute() {
        let driver = JinjaDriver::new("templates").unwrap();
        assert!(driver.tmpl_dir().is_absolute());
        assert!(driver.tmpl_dir().ends_with("templates"));
    }

    #[test]
    fn concurrent_renders_while_toggling_debug() {
        let dir = templates(&[("page.txt", "{{ n }}")]);
        let driver = Arc::new(JinjaDriver::new(dir.path()).unwrap());

        let renders: Vec<_> = (0..4)
            .map(|i| {
                let driver = Arc::clone(&driver);
                thread::spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(render(&driver, "page.txt", json!({ "n": i }), &()), i.to_string());
                    }
                })
            })
            .collect();

        for round in 0..50 {
            driver.set_debug(round % 2 == 0);
        }
        for handle in renders {
            handle.join().unwrap();
        }
    }
}
