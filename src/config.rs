use std::env;

/// Runtime configuration for the exchange core, read from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Base URL of the identity directory service.
    pub directory_url: String,
    /// Base URL of the payment capability.
    pub payment_url: String,
    /// Amount disbursed to each snapshot account on settlement.
    pub payout_per_account: f64,
    /// Flat component of a query's quoted cost.
    pub cost_base: f64,
    /// Per-snapshot-account component of a query's quoted cost.
    pub cost_per_account: f64,
    /// Aggregate entries with a count below this floor are dropped before
    /// results are released. `None` disables the floor.
    pub min_count_threshold: Option<u64>,
    /// Path of the SQLite disbursement log. `None` keeps the log in memory.
    pub disbursement_db: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let directory_url = env::var("DIRECTORY_URL")
            .map_err(|_| ConfigError::MissingVariable("DIRECTORY_URL".to_string()))?;

        if !directory_url.starts_with("http://") && !directory_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "DIRECTORY_URL must start with http:// or https://".to_string(),
            ));
        }

        let payment_url = env::var("PAYMENT_URL")
            .map_err(|_| ConfigError::MissingVariable("PAYMENT_URL".to_string()))?;

        if !payment_url.starts_with("http://") && !payment_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_URL must start with http:// or https://".to_string(),
            ));
        }

        let payout_per_account = env::var("PAYOUT_PER_ACCOUNT")
            .unwrap_or_else(|_| "1.0".to_string())
            .parse::<f64>()
            .map_err(|_| {
                ConfigError::InvalidValue("PAYOUT_PER_ACCOUNT must be a number".to_string())
            })?;

        if payout_per_account <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "PAYOUT_PER_ACCOUNT must be positive".to_string(),
            ));
        }

        let cost_base = env::var("COST_BASE")
            .unwrap_or_else(|_| "10.0".to_string())
            .parse::<f64>()
            .unwrap_or(10.0);

        let cost_per_account = env::var("COST_PER_ACCOUNT")
            .unwrap_or_else(|_| "2.0".to_string())
            .parse::<f64>()
            .unwrap_or(2.0);

        let min_count_threshold = match env::var("MIN_COUNT_THRESHOLD") {
            Ok(raw) => Some(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "MIN_COUNT_THRESHOLD must be a non-negative integer".to_string(),
                )
            })?),
            Err(_) => None,
        };

        let disbursement_db = env::var("DISBURSEMENT_DB").ok();

        Ok(Self {
            directory_url,
            payment_url,
            payout_per_account,
            cost_base,
            cost_per_account,
            min_count_threshold,
            disbursement_db,
        })
    }
}
