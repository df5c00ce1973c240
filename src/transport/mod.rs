//! The byte-stream layer over discrete chat messages.
//!
//! [`stream`] turns a message feed plus a message sender into an ordered
//! read/write byte channel; [`mux`] puts the external multiplexer on top of
//! it so many logical connections share the one channel.

pub mod mux;
pub mod stream;

pub use stream::{MessageStream, StreamReadHalf, StreamWriteHalf};
