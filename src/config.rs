use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub access_secret: String,
    pub refresh_secret: String,
    pub bcrypt_cost: u32,
    pub frontend_origin: String,
    /// Upper bound on any single store call; exceeding it fails the
    /// operation with a Timeout error.
    pub store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let bcrypt_cost = env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(bcrypt::DEFAULT_COST);
        let store_timeout_ms = env::var("STORE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000u64);

        Self {
            mongo_uri: env::var("MONGO_URI").expect("MONGO_URI must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "taskmate".to_string()),
            access_secret: env::var("ACCESS_SECRET").expect("ACCESS_SECRET must be set"),
            refresh_secret: env::var("REFRESH_SECRET").expect("REFRESH_SECRET must be set"),
            bcrypt_cost,
            frontend_origin: env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            store_timeout: Duration::from_millis(store_timeout_ms),
        }
    }
}
