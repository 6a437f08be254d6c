pub mod crypto;
pub mod encoding;
pub mod tls;
pub mod validation;
