//! Ingestion of native symbol dumps.
//!
//! Three structurally different dump formats (Unix `nm` symbol tables,
//! Mach-O `nm` symbol tables, Windows linker MAP files) are normalized
//! into one uniform stream of named address ranges, relocated into and
//! clipped to the window a library occupies in the profiled process.

mod mac;
mod unix;
mod winmap;

use std::fmt::Debug;
use std::path::Path;
use std::path::PathBuf;

use crate::Addr;
use crate::Result;

pub use mac::MacSymbolProvider;
pub use unix::UnixSymbolProvider;
pub use winmap::WindowsMapProvider;


/// The address window a native library occupies in the profiled
/// process, as declared by a `shared-library` log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryWindow {
    /// The name (path) of the library.
    pub name: String,
    /// The first address covered by the library.
    pub start: Addr,
    /// The first address past the library.
    pub end: Addr,
    /// The relocation delta to apply to symbol addresses that were
    /// computed against a different load address.
    pub slide: i64,
}


/// A provider of native symbols for one platform's dump format.
///
/// Implementations load the raw dump text for a library (e.g. by
/// spawning `nm` or reading a linker MAP file) and report the named
/// address ranges it defines, relocated into `window` and clipped to
/// it, by invoking `sink` once per range with `(name, start, end)`.
pub trait SymbolProvider: Debug {
    /// Resolve the native symbols covering `window`.
    ///
    /// A library without usable symbols reports zero ranges; only
    /// resource-acquisition failures (a missing symbol-listing binary,
    /// say) are reported as errors.
    fn resolve_symbols(
        &mut self,
        window: &LibraryWindow,
        sink: &mut dyn FnMut(&str, Addr, Addr),
    ) -> Result<()>;
}


/// The platform whose toolchain produced the symbol dumps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Platform {
    /// Unix-style `nm` symbol tables.
    Unix,
    /// Mach-O-style `nm` symbol tables.
    Mac,
    /// Windows linker MAP files.
    Windows,
    /// Pick the platform this program was built for.
    #[default]
    Auto,
}

impl Platform {
    /// Resolve [`Platform::Auto`] to a concrete platform.
    pub fn effective(self) -> Self {
        match self {
            Self::Auto if cfg!(target_os = "windows") => Self::Windows,
            Self::Auto if cfg!(target_os = "macos") => Self::Mac,
            Self::Auto => Self::Unix,
            other => other,
        }
    }
}


/// Create the symbol provider for `platform`.
///
/// `nm` is the symbol-listing binary to spawn where the platform uses
/// one. `target_root` optionally redirects library paths into an
/// extracted target file system, and `apk_embedded_library` substitutes
/// the actual library path for libraries reported as an `.apk`.
pub fn provider_for(
    platform: Platform,
    nm: PathBuf,
    target_root: Option<String>,
    apk_embedded_library: Option<String>,
) -> Box<dyn SymbolProvider> {
    match platform.effective() {
        Platform::Unix | Platform::Auto => Box::new(UnixSymbolProvider::new(
            nm,
            target_root,
            apk_embedded_library,
        )),
        Platform::Mac => Box::new(MacSymbolProvider::new(
            nm,
            target_root,
            apk_embedded_library,
        )),
        Platform::Windows => Box::new(WindowsMapProvider::new(target_root)),
    }
}


/// Compute the path a library's symbols should be loaded from.
fn effective_lib_path(
    lib: &str,
    target_root: Option<&str>,
    apk_embedded_library: Option<&str>,
) -> String {
    let lib = match apk_embedded_library {
        Some(embedded) if lib.ends_with(".apk") => embedded,
        _ => lib,
    };
    match target_root {
        // Within a target root only the file name is meaningful.
        Some(root) => {
            let name = lib.rsplit('/').next().unwrap_or(lib);
            Path::new(root).join(name).to_string_lossy().into_owned()
        }
        None => lib.to_string(),
    }
}


/// A symbol record as parsed from one dump line, before range
/// inference.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RawSymbol {
    pub name: String,
    pub start: Addr,
    /// The symbol's size, if the dump carries one. A size of zero is
    /// recorded as `None`: such records only mark an address and their
    /// extent must be inferred from the following record.
    pub size: Option<u64>,
}


/// An iterator over the complete, terminator-delimited lines of a dump.
///
/// An unterminated trailing fragment is not a line and is ignored, as
/// it would be by the dumping toolchain's own consumers.
pub(crate) fn terminated_lines<'dump>(
    dump: &'dump str,
    terminator: &'static str,
) -> impl Iterator<Item = &'dump str> {
    let complete = match dump.rfind(terminator) {
        Some(idx) => &dump[..idx],
        None => "",
    };
    complete.split(terminator).filter(|line| !line.is_empty())
}


/// The accumulator inferring address ranges from a stream of
/// [`RawSymbol`] records.
///
/// Sized records are emitted directly. A size-less record extends to
/// the start of the next record; two records at the same address
/// therefore collapse the first to nothing, which also disposes of
/// zero-width linker temporaries such as Arm mapping symbols. Exact
/// `(start, end)` duplicates are emitted once. All emitted ranges are
/// contained in the window; out-of-window records are dropped.
#[derive(Debug)]
pub(crate) struct RangeAccumulator<'win> {
    window: &'win LibraryWindow,
    /// A size-less symbol awaiting the next record's start address.
    pending: Option<(String, Addr)>,
    /// The range emitted last, for duplicate collapsing.
    last: Option<(Addr, Addr)>,
}

impl<'win> RangeAccumulator<'win> {
    pub fn new(window: &'win LibraryWindow) -> Self {
        Self {
            window,
            pending: None,
            last: None,
        }
    }

    /// Relocate a dump address into the library's window.
    ///
    /// Dumps either carry addresses relative to the library's own image
    /// (offsets well below the load address) or addresses that only
    /// need the load-time slide applied.
    fn relocate(&self, addr: Addr) -> Addr {
        let window = self.window;
        let dump_relative = (addr as i128) < window.start as i128 - window.slide as i128
            && addr < window.end.saturating_sub(window.start);
        if dump_relative {
            addr.wrapping_add(window.start)
        } else {
            (addr as i128 + window.slide as i128) as Addr
        }
    }

    fn emit(
        &mut self,
        name: &str,
        start: Addr,
        end: Addr,
        sink: &mut dyn FnMut(&str, Addr, Addr),
    ) {
        if self.last == Some((start, end)) {
            return
        }
        if start < self.window.start || end > self.window.end {
            return
        }
        let () = sink(name, start, end);
        self.last = Some((start, end));
    }

    fn feed(
        &mut self,
        name: String,
        start: Addr,
        end: Option<Addr>,
        sink: &mut dyn FnMut(&str, Addr, Addr),
    ) {
        if let Some((pending_name, pending_start)) = self.pending.take() {
            // Close the pending symbol at this record's start. An equal
            // or smaller start leaves no room; the pending symbol is
            // discarded.
            if pending_start < start {
                let () = self.emit(&pending_name, pending_start, start, sink);
            }
        }

        match end {
            Some(end) => self.emit(&name, start, end, sink),
            None => self.pending = Some((name, start)),
        }
    }

    /// Add one parsed symbol record.
    pub fn add(&mut self, symbol: RawSymbol, sink: &mut dyn FnMut(&str, Addr, Addr)) {
        let start = self.relocate(symbol.start);
        let end = symbol
            .size
            .filter(|size| *size != 0)
            .map(|size| start.wrapping_add(size));
        let () = self.feed(symbol.name, start, end, sink);
    }

    /// Conclude the dump, closing a pending symbol at the window's end.
    pub fn finish(mut self, sink: &mut dyn FnMut(&str, Addr, Addr)) {
        let end = self.window.end;
        let () = self.feed(String::new(), end, None, sink);
    }
}
