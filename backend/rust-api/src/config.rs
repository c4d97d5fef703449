use serde::Deserialize;
use std::env;

pub const DEFAULT_UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Some(StoreBackend::Mongo),
            "memory" | "in-memory" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

/// S3-compatible bucket holding the audio recordings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub audio_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app_env: String,
    pub bind_address: String,
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub id_token_ttl_seconds: i64,
    pub password_hash_cost: u32,
    pub password_reset_ttl_seconds: i64,
    pub public_base_url: String,
    pub signed_url_ttl_seconds: u64,
    pub upload_limit_bytes: usize,
    pub object_storage: Option<ObjectStorageSettings>,
    pub superuser_seed_file: Option<String>,
    pub metrics_basic_auth: String,
}

impl Config {
    /// Settings for a local process with no external services: memory store,
    /// in-memory blobs, a throwaway JWT secret.
    pub fn development() -> Self {
        Config {
            app_env: "dev".to_string(),
            bind_address: "0.0.0.0:8081".to_string(),
            store_backend: StoreBackend::Memory,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "assessments".to_string(),
            jwt_secret: "dev-secret-only-for-local-testing".to_string(),
            id_token_ttl_seconds: 3600,
            password_hash_cost: bcrypt::DEFAULT_COST,
            password_reset_ttl_seconds: 3600,
            public_base_url: "http://localhost:5173".to_string(),
            signed_url_ttl_seconds: 60,
            upload_limit_bytes: DEFAULT_UPLOAD_LIMIT_BYTES,
            object_storage: None,
            superuser_seed_file: None,
            metrics_basic_auth: "admin:changeme".to_string(),
        }
    }

    pub fn load() -> Result<Self, config::ConfigError> {
        // Local .env first, then the repository root one
        if dotenvy::dotenv().is_err() {
            dotenvy::from_path("../../.env").ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/<env>.toml + APP__SECTION__KEY overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::development();

        let bind_address = settings
            .get_string("server.bind_address")
            .or_else(|_| env::var("BIND_ADDRESS"))
            .unwrap_or(defaults.bind_address);

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .ok();

        let store_backend = match settings
            .get_string("store.backend")
            .or_else(|_| env::var("STORE_BACKEND"))
        {
            Ok(raw) => StoreBackend::parse(&raw).ok_or_else(|| {
                config::ConfigError::Message(format!("Unknown store backend: {}", raw))
            })?,
            // A configured Mongo URI implies the Mongo backend
            Err(_) if mongo_uri.is_some() => StoreBackend::Mongo,
            Err(_) => StoreBackend::Memory,
        };

        if env == "prod" && store_backend == StoreBackend::Memory {
            return Err(config::ConfigError::Message(
                "The in-memory store is not allowed in production".to_string(),
            ));
        }

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        let id_token_ttl_seconds = settings
            .get_int("auth.id_token_ttl_seconds")
            .unwrap_or(defaults.id_token_ttl_seconds);

        let password_hash_cost = settings
            .get_int("auth.password_hash_cost")
            .map(|cost| cost as u32)
            .unwrap_or(defaults.password_hash_cost);

        let password_reset_ttl_seconds = settings
            .get_int("auth.password_reset_ttl_seconds")
            .unwrap_or(defaults.password_reset_ttl_seconds);

        let superuser_seed_file = settings
            .get_string("auth.superuser_seed_file")
            .or_else(|_| env::var("SUPERUSER_SEED_FILE"))
            .ok()
            .filter(|path| !path.is_empty());

        let public_base_url = settings
            .get_string("app.public_base_url")
            .or_else(|_| env::var("PUBLIC_BASE_URL"))
            .unwrap_or(defaults.public_base_url);

        let signed_url_ttl_seconds = settings
            .get_int("storage.signed_url_ttl_seconds")
            .map(|ttl| ttl.max(1) as u64)
            .unwrap_or(defaults.signed_url_ttl_seconds);

        let upload_limit_bytes = settings
            .get_int("storage.upload_limit_bytes")
            .map(|limit| limit.max(0) as usize)
            .unwrap_or(defaults.upload_limit_bytes);

        let object_storage = match settings.get::<ObjectStorageSettings>("object_storage") {
            Ok(storage) => Some(storage),
            Err(config::ConfigError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };

        let metrics_basic_auth = settings
            .get_string("metrics.basic_auth")
            .or_else(|_| env::var("METRICS_AUTH"))
            .unwrap_or(defaults.metrics_basic_auth);

        Ok(Config {
            app_env: env,
            bind_address,
            store_backend,
            mongo_uri: mongo_uri.unwrap_or(defaults.mongo_uri),
            mongo_database,
            jwt_secret,
            id_token_ttl_seconds,
            password_hash_cost,
            password_reset_ttl_seconds,
            public_base_url,
            signed_url_ttl_seconds,
            upload_limit_bytes,
            object_storage,
            superuser_seed_file,
            metrics_basic_auth,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "prod"
    }
}
