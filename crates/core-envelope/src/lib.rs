//! Notary Core Envelope
//!
//! The span data model and its canonical encoding. A span is one structured
//! fact ("who did this") plus provenance metadata; once signed it also
//! carries a BLAKE3 digest of its canonical form and a signature over that
//! digest.
//!
//! # Example
//!
//! ```
//! use notary_core_envelope::{Metadata, Span, digest, canonicalize_unsigned};
//!
//! let span = Span::new(
//!     "span-1", "activity", "observer", "focused", "device:a", "complete",
//!     Metadata::at("2025-10-31T18:00:00Z"), "private",
//! );
//! let bytes = canonicalize_unsigned(&span).unwrap();
//! assert!(digest(&bytes).starts_with("b3:"));
//! ```

pub mod canonical;
pub mod digest;
pub mod error;
pub mod span;
pub mod value;

pub use canonical::{canonicalize, canonicalize_unsigned};
pub use digest::{digest, digest_bytes, parse_digest, span_digest, DIGEST_PREFIX};
pub use error::{EnvelopeError, Result};
pub use span::{Metadata, Signature, Span};
pub use value::{Value, ValueMap};
