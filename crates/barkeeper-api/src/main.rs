use barkeeper_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (blob store, upload policy, routes)
    let (_state, router) = barkeeper_api::setup::initialize_app(config.clone()).await?;

    // Start the server
    barkeeper_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
