use dotenvy;

#[derive(Debug)]
pub struct AppConfig {
    pub db_namespace: String,
    pub db_database: String,
    pub db_password: Option<String>,
    pub db_username: Option<String>,
    pub db_url: String,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub is_development: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let db_namespace = std::env::var("DB_NAMESPACE").unwrap_or("namespace".to_string());
        let db_database = std::env::var("DB_DATABASE").unwrap_or("database".to_string());
        let db_password = std::env::var("DB_PASSWORD").ok();
        let db_username = std::env::var("DB_USERNAME").ok();
        let db_url = std::env::var("DB_URL").unwrap_or("mem://".to_string());

        let cache_ttl_secs: u64 = std::env::var("CACHE_TTL_SECS")
            .unwrap_or("300".to_string())
            .parse()
            .expect("CACHE_TTL_SECS should be number");

        let cache_capacity: usize = std::env::var("CACHE_CAPACITY")
            .unwrap_or("100".to_string())
            .parse()
            .expect("CACHE_CAPACITY should be number");

        let is_development = std::env::var("DEVELOPMENT")
            .map(|v| v.eq("true"))
            .unwrap_or(false);

        Self {
            db_namespace,
            db_database,
            db_password,
            db_username,
            db_url,
            cache_ttl_secs,
            cache_capacity,
            is_development,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_namespace: "namespace".to_string(),
            db_database: "database".to_string(),
            db_password: None,
            db_username: None,
            db_url: "mem://".to_string(),
            cache_ttl_secs: 300,
            cache_capacity: 100,
            is_development: false,
        }
    }
}
