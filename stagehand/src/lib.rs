//! Drives work items through `idea -> researched -> planned -> implementing -> in_pr -> done`
//! by delegating each phase to an external agent process.
//!
//! The crate keeps a strict split:
//!
//! - **[`core`]**: pure logic (workflow state machine, limits, containment diffing,
//!   quality gates). No I/O.
//! - **[`io`]**: side effects (config, persistence, git, pull-request host, agent
//!   processes, compute backend). Trait seams make every collaborator replaceable
//!   in tests.
//!
//! Phase modules ([`research`], [`plan`], [`implement`], [`pr`], [`complete`]) combine
//! the two behind a shared [`phase::ExecutionContext`]; [`next`] picks the phase from
//! the item's state.

pub mod complete;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod implement;
pub mod ingest;
pub mod init;
pub mod io;
pub mod item;
pub mod logging;
pub mod next;
pub mod phase;
pub mod plan;
pub mod pr;
pub mod prd;
pub mod research;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
