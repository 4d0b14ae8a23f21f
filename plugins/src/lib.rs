pub mod connectivity;
pub mod factory;
pub mod provider;
pub mod services;
