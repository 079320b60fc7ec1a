use studio_newsletter::config::get_configuration;
use studio_newsletter::startup::Application;
use studio_newsletter::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber(String::from("studio_newsletter"), String::from("info"));

    init_subscriber(subscriber);

    let config = get_configuration().expect("Missing configuration file.");
    let application = Application::build(config.clone()).await?;

    tracing::info!("Server listening on {}", config.get_address());

    application.run_until_stop().await
}
