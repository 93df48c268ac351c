// src/config.rs

use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;

/// Minimum score (in percent) for an attempt to count as passed.
pub const PASSING_SCORE_PERCENTAGE: i64 = 50;

/// Bounds on the number of candidate answers a question may carry.
pub const MIN_ANSWERS_PER_QUESTION: usize = 2;
pub const MAX_ANSWERS_PER_QUESTION: usize = 10;

/// Number of recent attempts shown alongside a fiche.
pub const RECENT_ATTEMPTS_LIMIT: i64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Lifetime of login tokens, in seconds.
    pub jwt_expiration: u64,
    /// Lifetime of the token handed out when a quiz is opened, in seconds.
    pub quiz_token_ttl: u64,
    pub listen_addr: SocketAddr,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = parse_var("JWT_EXPIRATION", 86_400);
        let quiz_token_ttl = parse_var("QUIZ_TOKEN_TTL", 7_200);
        let listen_addr = parse_var("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)));

        let rust_log = log_filter();

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            quiz_token_ttl,
            listen_addr,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }
}

/// Log filter directive from `RUST_LOG`, `info` when unset.
///
/// Read on its own so logging can be set up before the rest of the
/// configuration is parsed and its warnings are not lost.
pub fn log_filter() -> String {
    env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_or_default(key, env::var(key).ok().as_deref(), default)
}

fn parse_or_default<T: std::str::FromStr>(key: &str, raw: Option<&str>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}
