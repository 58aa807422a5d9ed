//! scenewire translates streams of scene-description events (nodes, fields,
//! prototypes, routes) into serialized forms: a classic textual encoding, an
//! XML encoding, and a compact bit-packed binary encoding with
//! dictionary-compressed names and per-field-type compression.
//!
//! The binary codec is two-pass by design: a statistics pass observes the
//! whole document and freezes the dictionaries and bit widths, then a second
//! replay of the same events emits the byte stream.

pub mod error;
pub mod event;
pub mod schema;
pub mod values;

pub mod encoding;
pub mod options;
pub mod parser;

pub use error::{DecodeError, ExportError};
pub use event::{Event, EventBuffer, SceneHandler};
pub use options::{CompressionProfile, ExportOptions};
