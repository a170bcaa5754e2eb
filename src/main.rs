use stop_locator::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}
