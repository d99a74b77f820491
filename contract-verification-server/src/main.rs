use blockscout_service_launcher::launcher::ConfigSettings;
use contract_verification_server::Settings;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().expect("failed to read config");
    contract_verification_server::run(settings).await
}
