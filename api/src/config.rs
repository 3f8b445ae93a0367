use config::{Environment, File, FileFormat};

const SERVER_ADDRESS: &str = "0.0.0.0:80";
const ENVIRONMENT: &str = "development";

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    pub server_address: String,
    pub env: String,
    /// Seconds a connection may take from accept to response.
    pub timeout: u64,
}

impl Config {
    /// Reads `config.toml` when present, then `SERVER_ADDRESS`, `ENV` and
    /// `TIMEOUT` from the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_sources(
            File::new("config.toml", FileFormat::Toml).required(false),
            Environment::default(),
        )
    }

    fn from_sources<F, E>(file: F, env: E) -> anyhow::Result<Self>
    where
        F: ::config::Source + Send + Sync + 'static,
        E: ::config::Source + Send + Sync + 'static,
    {
        let config = ::config::Config::builder()
            .set_default("server_address", SERVER_ADDRESS)?
            .set_default("env", ENVIRONMENT)?
            .set_default("timeout", 15)?
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}
