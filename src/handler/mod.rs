pub mod accounts;
pub mod admin;
pub mod bids;
pub mod messages;
pub mod notifications;
pub mod payments;
pub mod quotes;
