pub mod bus;
pub mod store;

pub use bus::RedisBus;
pub use store::RedisStore;
