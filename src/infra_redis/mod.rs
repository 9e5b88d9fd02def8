mod auth_session_store_redis;

pub use auth_session_store_redis::*;
