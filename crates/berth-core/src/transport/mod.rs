//! Concrete adapters behind the distributor's capability traits.

pub mod age;
pub mod command;
pub mod http;

pub use age::AgeCliEncryptor;
pub use command::CommandKeySource;
pub use http::HttpSecretStore;
