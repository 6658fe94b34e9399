use anyhow::Context;
use framechat::{
    arguments::{self, ServerArguments},
    init_tracing,
    server::Server,
};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args: ServerArguments = arguments::parse();
    init_tracing(args.console)?;

    let server = Server::bind((args.address, args.port), args.queue_capacity).await?;

    tokio::select! {
        result = server.run() => result,
        result = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            result.context("Failed to listen for ctrl-c")
        }
    }
}
