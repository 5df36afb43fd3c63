pub mod analysis;
pub mod budget;
pub mod domain;
pub mod export;
pub mod ingest;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub youtube_api_key: Option<String>,
        pub youtube_base_url: Option<String>,
        pub trends_base_url: Option<String>,
        pub trends_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_env("DATABASE_URL"),
                sentry_dsn: non_empty_env("SENTRY_DSN"),
                youtube_api_key: non_empty_env("YOUTUBE_API_KEY"),
                youtube_base_url: non_empty_env("YOUTUBE_BASE_URL"),
                trends_base_url: non_empty_env("TRENDS_BASE_URL"),
                trends_api_key: non_empty_env("TRENDS_API_KEY"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_youtube_api_key(&self) -> anyhow::Result<&str> {
            self.youtube_api_key
                .as_deref()
                .context("YOUTUBE_API_KEY is required (set it in the environment or .env)")
        }

        pub fn require_trends_base_url(&self) -> anyhow::Result<&str> {
            self.trends_base_url
                .as_deref()
                .context("TRENDS_BASE_URL is required")
        }
    }

    fn non_empty_env(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
