pub mod authorize;
pub mod debug;
pub mod federate;
pub mod health;
pub mod index;
pub mod receive;
pub mod upload;
