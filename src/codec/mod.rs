//! Opus codec wrappers
//!
//! Fixed configuration for voice transport: 48 kHz, stereo, 20 ms
//! frames. Encoding is shared per connection; decoding is per sender,
//! because Opus decoders carry prediction state that must not be mixed
//! across unrelated streams.

pub mod decoder;
pub mod encoder;

pub use decoder::StreamDecoder;
pub use encoder::OpusEncoder;
