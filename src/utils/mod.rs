pub mod content_filter;
pub mod pricing;
pub mod token;
pub mod webhook;
