mod authenticator;
mod bearer;
mod client;
mod error;
mod oauth2_auth;

pub use authenticator::Authenticator;
pub use bearer::BearerAuthenticator;
pub use client::ForwardClient;
pub use error::ForwardError;
pub use oauth2_auth::OAuth2Authenticator;
