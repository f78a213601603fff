use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_key: String,
    /// Endpoint of the external push provider (one POST per campaign).
    pub provider_url: String,
    /// Static API key sent in the `x-api-key` header to the provider.
    pub provider_api_key: String,
    /// Fallback sweep interval for the dispatcher, in seconds. The sweep
    /// picks up campaigns left pending by a crash; normal dispatch is
    /// nudged immediately after intake.
    pub sweep_interval_secs: u64,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let admin_key =
        std::env::var("PUSHGATE_ADMIN_KEY").unwrap_or_else(|_| "CHANGE_ME_ADMIN_KEY".into());

    if admin_key == "CHANGE_ME_ADMIN_KEY" {
        let env_mode = std::env::var("PUSHGATE_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "PUSHGATE_ADMIN_KEY is still the insecure placeholder. \
                 Set a proper key before running in production."
            );
        }
        eprintln!("⚠️  PUSHGATE_ADMIN_KEY is not set — using insecure placeholder. Set a real key for production.");
    }

    Ok(Config {
        port: std::env::var("PUSHGATE_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/pushgate".into()),
        admin_key,
        provider_url: std::env::var("PUSHGATE_PROVIDER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9400/v1/send".into()),
        provider_api_key: std::env::var("PUSHGATE_PROVIDER_API_KEY").unwrap_or_default(),
        sweep_interval_secs: std::env::var("PUSHGATE_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
    })
}
