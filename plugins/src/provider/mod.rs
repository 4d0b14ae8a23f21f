pub mod command;
pub mod http;

pub use command::CommandProvider;
pub use http::{HttpProvider, ProviderHttpError, ProviderHttpErrorKind};
