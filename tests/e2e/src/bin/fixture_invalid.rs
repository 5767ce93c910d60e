#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nimbus_plugin_api::serve(e2e::Invalid).await?;
    Ok(())
}
