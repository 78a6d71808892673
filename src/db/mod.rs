pub mod accountdb;
pub mod auditdb;
pub mod biddb;
pub mod db;
pub mod memory;
pub mod messagedb;
pub mod notificationdb;
pub mod pgstore;
pub mod query_timeout;
pub mod quotedb;
pub mod store;
