use std::sync::Arc;

use micro_engine::{handler_fn, Chain, Config, Engine, Request, Response};
use micro_http::server::HttpEngine;
use micro_web::middleware::log;
use micro_web::render::{render_html, DriverRegistry, FuncMap};
use minijinja::Value;
use serde::Serialize;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Serialize)]
struct User {
    name: String,
}

#[derive(Serialize)]
struct Page {
    title: &'static str,
    user: User,
    items: Vec<&'static str>,
}

// run from crates/web, then: curl -v "http://127.0.0.1:8080/?name=micro"
#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let registry = DriverRegistry::default();
    let driver = registry.create("jinja", "templates").expect("can't create jinja driver");
    driver.set_debug(true);
    driver.set_func_map(FuncMap::from([("year".to_string(), Value::from_function(|| 2026))]));

    let page = handler_fn(move |req: &mut dyn Request, res: &mut dyn Response| {
        let driver = Arc::clone(&driver);
        Box::pin(async move {
            let name = match req.form_value("name") {
                name if name.is_empty() => "stranger".to_string(),
                name => name,
            };
            let page = Page { title: "micro-web", user: User { name }, items: vec!["engine", "middleware", "render"] };
            let data = match serde_json::to_value(&page) {
                Ok(data) => data,
                Err(e) => return res.error(Box::new(e)),
            };

            let helpers =
                FuncMap::from([("greet".to_string(), Value::from_function(|name: String| format!("Hello {name}!")))]);
            if let Err(e) = render_html(driver.as_ref(), res, "index.html", &data, &helpers) {
                res.error(Box::new(e));
            }
        })
    });

    let handler = Chain::builder().add_last(log()).build().then(page);
    let config = Config::builder().address("127.0.0.1:8080").build().expect("invalid config");
    let mut engine = HttpEngine::new(config);
    engine.set_handler(handler).expect("handler bound twice");

    if let Err(e) = engine.start().await {
        error!(cause = %e, "engine stopped with error");
    }
}
