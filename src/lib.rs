//! # rampart
//!
//! A ModSecurity-style WAF rule-evaluation engine in pure Rust.
//!
//! The crate implements the evaluation core: a five-phase transaction state
//! machine, the per-rule pipeline (variable selection, transformation
//! chain, operator match, action dispatch), rule chaining, and a
//! two-artifact audit log. Rule parsing, HTTP framing and the hosting proxy
//! live outside this crate; compiled rules arrive through [`RuleBuilder`]
//! and transactions are fed through documented setters.
//!
//! ## Quick start
//!
//! ```
//! use rampart::{Phase, Rule, Ruleset, Waf};
//!
//! # fn main() -> rampart::Result<()> {
//! let mut ruleset = Ruleset::new();
//! ruleset.add(
//!     Rule::builder()
//!         .variable("REQUEST_HEADERS", "User-Agent")
//!         .operator("streq", "badbot")
//!         .action("id", "100")
//!         .action("phase", "1")
//!         .action("deny", "")
//!         .build()?,
//! )?;
//!
//! let waf = Waf::new(ruleset);
//! let mut tx = waf.transaction();
//! tx.set_request_line("GET", "/", "HTTP/1.1");
//! tx.add_request_header("User-Agent", "badbot");
//! tx.execute_phase(Phase::RequestHeaders);
//!
//! assert!(tx.interrupted());
//! tx.execute_phase(Phase::Logging);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod actions;
pub mod audit;
pub mod collections;
pub mod engine;
pub mod error;
pub mod operators;
pub mod transformations;

// Re-export main types at crate root
pub use audit::AuditLogger;
pub use collections::{Collection, KeySelector, MatchData};
pub use engine::{
    DisruptionKind, Interruption, MatchedRule, Phase, Rule, RuleBuilder, Ruleset, Transaction, Waf,
};
pub use error::{Error, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
