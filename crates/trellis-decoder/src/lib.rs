pub mod beam;
pub mod decoder;
pub mod error;
pub mod greedy;
pub mod hypothesis;
pub mod pool;

pub use beam::{Beam, Candidate};
pub use decoder::{BeamSearchDecoder, Decoded, DecoderConfig};
pub use error::DecodeError;
pub use greedy::decode_greedy;
pub use hypothesis::{extend_hash, Hypothesis, HASH_SEED};
pub use pool::HypothesisPool;
