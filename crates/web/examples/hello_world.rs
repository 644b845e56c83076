use micro_engine::{handler_fn, Chain, Config, Engine, Request, Response, StatusError};
use micro_http::server::HttpEngine;
use micro_web::middleware::log;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

// curl -v http://127.0.0.1:8080/
// curl -v -H "X-Real-IP: 1.2.3.4" http://127.0.0.1:8080/missing
#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let hello = handler_fn(|req: &mut dyn Request, res: &mut dyn Response| {
        Box::pin(async move {
            if req.url().path() != "/" {
                res.error(Box::new(StatusError::not_found(format!("{} not found\r\n", req.url().path()))));
                return;
            }
            res.header_mut().set("content-type", "text/plain; charset=utf-8");
            let _ = res.write_all(b"hello world\r\n");
        })
    });

    let handler = Chain::builder().add_last(log()).build().then(hello);

    let config = Config::builder().address("127.0.0.1:8080").max_requests_per_conn(100).build().expect("invalid config");
    let mut engine = HttpEngine::new(config);
    engine.set_handler(handler).expect("handler bound twice");

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("receive ctrl-c, shutting down");
            shutdown.shutdown();
        }
    });

    info!(port = 8080, "start listening");
    if let Err(e) = engine.start().await {
        error!(cause = %e, "engine stopped with error");
    }
}
