pub use crate::client::{Client, Event, Status};
pub use crate::config::Config;
pub use crate::shared::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
pub use ballast::session::{generate_keypair, PublicKey, SecretKey};
