pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        /// API key for the Pexels image search; lookups are disabled without it.
        #[serde(default)]
        pub pexels_api_key: Option<String>,
        #[serde(default = "default_pexels_base_url")]
        pub pexels_base_url: String,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_source(config::Environment::default())
        }

        pub(crate) fn from_source(environment: config::Environment) -> anyhow::Result<Self> {
            let settings = config::Config::builder().add_source(environment).build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_pexels_base_url() -> String {
        "https://api.pexels.com".to_string()
    }

}
pub mod entities;
pub mod image_search;
pub mod todo;
pub mod web;
