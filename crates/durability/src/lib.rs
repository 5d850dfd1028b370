//! Durability layer for Tally
//!
//! Everything that turns a [`CountsSnapshot`](tally_core::CountsSnapshot)
//! into bytes:
//!
//! - [`codec`]: the big-endian snapshot wire format, over any `Read`/`Write`
//! - [`checkpoint`]: crash-safe checkpoint files wrapping the codec payload
//!
//! Only the checkpoint module touches the file system.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod codec;

pub use checkpoint::{
    checkpoint_path, CheckpointInfo, CheckpointReader, CheckpointWriter, CHECKPOINT_FILE_NAME,
    CHECKPOINT_FORMAT_VERSION, CHECKPOINT_MAGIC,
};
pub use codec::{decode, decode_from_slice, encode, encode_to_vec, encoded_len};
