pub mod authenticator;
pub mod credentials;
pub mod oauth;
pub mod token_store;

pub use authenticator::GoogleAuthenticator;
pub use credentials::ClientCredentials;
pub use token_store::{StoredToken, TokenStore};
