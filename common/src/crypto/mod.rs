mod keypair;
pub mod random;

pub use keypair::{verify, Keypair, PublicKey, Signature, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};
