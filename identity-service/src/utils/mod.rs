pub mod cipher;
pub mod password;
pub mod validation;

pub use cipher::{CipherError, FieldCipher, SealedField};
pub use password::{CredentialHasher, Password, PasswordHashString};
pub use validation::ValidatedJson;
