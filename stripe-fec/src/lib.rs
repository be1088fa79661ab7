//! Stripe forward error correction library
//!
//! Provides the systematic Reed-Solomon arithmetic behind audit
//! verification: locating and repairing altered shares, rebuilding a
//! stripe from any `required` shares, and re-encoding the share
//! expected at an arbitrary piece number.
//!
//! # Quick Start
//!
//! ```rust
//! use stripe_fec::Fec;
//!
//! let fec = Fec::new(4, 6).unwrap();
//!
//! // Encode a stripe into six shares
//! let stripe = b"an example stripe payload!!!".to_vec();
//! let shares = fec.encode(&stripe).unwrap();
//!
//! // One node returns altered bytes for its share
//! let mut received = shares.clone();
//! received[2].data[0] ^= 0xff;
//!
//! // Correction restores it; diffing against the originals tells
//! // the caller which share was tampered with
//! let corrected = fec.correct(&received).unwrap();
//! assert_eq!(corrected, shares);
//! assert_ne!(received[2].data, corrected[2].data);
//!
//! // The stripe itself comes back from any four corrected shares
//! assert_eq!(fec.rebuild(&corrected[1..5]).unwrap(), stripe);
//! ```

pub mod error;
pub mod fec;
pub mod gf256;

// Re-export commonly used types
pub use error::{FecError, Result};
pub use fec::{Fec, Share};
