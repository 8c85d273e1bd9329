use std::net::SocketAddr;

use surge_testserver::{TestServerOptions, TestServerStats, TicketMode};
use tokio::net::TcpListener;
use tokio::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut opts = TestServerOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--mode" => {
                let mode = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--mode requires a value"))?;
                opts.mode = mode.parse::<TicketMode>().map_err(anyhow::Error::msg)?;
            }
            "--delay-ms" => {
                let ms: u64 = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--delay-ms requires a value"))?
                    .parse()?;
                opts.delay = Duration::from_millis(ms);
            }
            "-h" | "--help" => {
                eprintln!(
                    "surge-testserver\n\nUSAGE:\n  surge-testserver [--bind 127.0.0.1:0] [--mode created|degraded|unavailable] [--delay-ms N]\n\nOUTPUT:\n  Prints HTTP_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let app = surge_testserver::router(opts, TestServerStats::default());

    println!("HTTP_URL=http://{addr}");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    serve.await?;
    Ok(())
}
