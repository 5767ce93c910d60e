#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nimbus_plugin_api::serve(e2e::Greeter).await?;
    Ok(())
}
