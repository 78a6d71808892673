pub mod account_service;
pub mod audit_service;
pub mod bid_service;
pub mod blob_store;
pub mod error;
pub mod identity_service;
pub mod lifecycle;
pub mod moderation_service;
pub mod notification_service;
pub mod push_transport;
pub mod quote_service;
pub mod signature_provider;
