mod host;
mod runtime;
mod sensors;
mod store;
mod transport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
