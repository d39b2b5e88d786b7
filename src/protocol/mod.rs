//! WebSocket wire types and message decoding.
//!
//! # Wire Format
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | Outbound | Text frame: a raw string as-is, or structured data as JSON |
//! | Inbound | Text or binary frame, or a fragment sequence concatenated in order |
//!
//! Every inbound message is decoded into a [`DecodedMessage`], a JSON
//! object the host can ingest directly.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `decoder` | Inbound text → [`DecodedMessage`] |
//! | `frame` | Raw frames and outbound encoding |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound message decoding.
pub mod decoder;

/// Raw frame types.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use decoder::{DecodedMessage, VALUE_KEY, decode, decode_text};
pub use frame::{Inbound, Outbound, RawFrame};
