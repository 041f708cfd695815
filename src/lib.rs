//! **tickproc** is an offline post-processor for the tick logs emitted
//! by a managed runtime's CPU-sampling profiler.
//!
//! A completed log — a stream of code-lifecycle records, shared-library
//! declarations, and sampled ticks — is replayed into an attribution of
//! execution time to named code regions: interpreted functions,
//! stubs and builtins, inline-cache variants, bytecode handlers, and
//! native library symbols, grouped by the state the runtime was in when
//! each sample was taken.
//!
//! The main entry point is [`TickProcessor`], which consumes a log
//! (and, through a [`symdump::SymbolProvider`], the native symbol
//! dumps of the libraries the log references) and produces a
//! [`Report`]:
//!
//! ```no_run
//! use std::io::stdout;
//! use std::path::Path;
//!
//! use tickproc::symdump;
//! use tickproc::Config;
//! use tickproc::TickProcessor;
//!
//! # fn main() -> tickproc::Result<()> {
//! let config = Config::default();
//! let provider = symdump::provider_for(
//!     config.platform,
//!     config.nm.clone(),
//!     config.target_root.clone(),
//!     config.apk_embedded_library.clone(),
//! );
//! let mut processor = TickProcessor::new(config, provider);
//! let () = processor.process_log_file(Path::new("ticks.log"))?;
//! let report = processor.into_report("ticks.log");
//! let () = report.render(&mut stdout().lock())?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod codemap;
mod demangle;
mod error;
mod logreader;
mod processor;
mod profile;
mod report;
pub mod symdump;
mod util;

pub use crate::codemap::Category;
pub use crate::codemap::CodeEntry;
pub use crate::codemap::CodeMap;
pub use crate::demangle::unmangle_msvc;
pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::Result;
pub(crate) use crate::error::IntoError;
pub use crate::processor::Config;
pub use crate::processor::TickProcessor;
pub use crate::processor::TimeRange;
pub use crate::profile::VmState;
pub use crate::report::HeavyNode;
pub use crate::report::Report;
pub use crate::report::ReportEntry;


/// A type representing addresses.
pub type Addr = u64;
