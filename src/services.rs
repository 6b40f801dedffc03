pub mod access_service;
pub mod campaign_service;
pub mod leaderboard_service;
pub mod wallet_service;
pub mod work_service;
