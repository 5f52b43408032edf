//! Pull-based media source.
//!
//! A [`MediaSource`] exposes the elementary streams of a random-access
//! [`ByteSource`](input::ByteSource) and delivers their data on request,
//! while a pluggable [`Backend`](backend::Backend) does the demultiplexing.
//! The bundled backend uses symphonia's container readers.

pub mod backend;
pub mod common;
pub mod configs;
pub mod input;
pub mod media;
pub mod source;

pub use common::{Result, SourceError, StartPosition, TimeFormat, Token};
pub use source::{MediaSource, MediaStream, SourceCharacteristics, SourceState};
