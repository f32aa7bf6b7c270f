//! Veristream session engines.
//!
//! Two session types, one per side of the protocol:
//!
//! - [`Signer`] consumes the outgoing coded stream and produces signed SEI
//!   units to interleave with it.
//! - [`Validator`] consumes the (possibly damaged) incoming stream and
//!   classifies every picture unit as authentic, tampered, missing, or
//!   pending, emitting an [`AuthenticityReport`] whenever a group of
//!   pictures is concluded.
//!
//! Both are sans-IO and single-threaded: nothing blocks, every state change
//! is driven by one ingested unit, and independent sessions share no state.
//!
//! ```no_run
//! use veristream_core::{Authenticity, Validator};
//! use veristream_proto::Codec;
//!
//! # fn main() -> Result<(), veristream_core::SessionError> {
//! let mut validator = Validator::new(Codec::H264);
//! # let units: Vec<Vec<u8>> = Vec::new();
//! let mut damaged = Vec::new();
//! for unit in &units {
//!     if let Some(report) = validator.add_unit(unit)? {
//!         if report.latest.authenticity != Authenticity::Ok {
//!             damaged.push(report.latest.validation.clone());
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gop;
pub mod report;
pub mod signer;
pub mod validator;
pub mod verdict;

mod window;

pub use error::{Result, SessionError};
pub use gop::GopPhase;
pub use report::{AccumulatedValidation, Authenticity, AuthenticityReport, LatestValidation};
pub use signer::{AuthenticityLevel, Signer};
pub use validator::{MAX_PENDING_GOPS, Validator};
pub use verdict::Verdict;
