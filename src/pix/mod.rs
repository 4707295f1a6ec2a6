//! Static BR Code ("Pix copia e cola") rendering.
//!
//! `payload::encode` builds the TLV string and `crc::checksum` seals it.
//! Both are pure: the same inputs always yield the same bytes.

pub mod crc;
pub mod payload;

pub use payload::{Field, Merchant, Payload, encode, parse, verify};
