//! Codec adapter
//!
//! Decoding goes through symphonia (WAV 8/16/24/32 PCM and float, FLAC,
//! OGG Vorbis, lenient about unknown chunks); encoding through hound (WAV),
//! flac-bound (FLAC) and an external `ffmpeg` fallback for OGG Vorbis. BWF
//! and iXML metadata is carried alongside the samples, never computed.

pub mod decode;
pub mod encode;
pub mod metadata;

pub use decode::{decode, DecodedAudio};
pub use encode::{encode, EncodeFormat, EncodeRequest};
pub use metadata::{AudioMetadata, BwfMetadata};
