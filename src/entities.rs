pub mod campaign;
pub mod user_auth;
pub mod wallet;
