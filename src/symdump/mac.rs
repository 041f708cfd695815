//! Parsing of Mach-O-style `nm` symbol tables.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;
use tracing::warn;

use crate::Addr;
use crate::ErrorExt as _;
use crate::Result;

use super::effective_lib_path;
use super::terminated_lines;
use super::unix::is_hex_field;
use super::LibraryWindow;
use super::RangeAccumulator;
use super::RawSymbol;
use super::SymbolProvider;


/// Parse a single Mach-O `nm` output line.
///
/// Lines have the form `<address> <name>`; there is never a size
/// column, so every symbol's extent is inferred from its successor.
fn parse_line(line: &str) -> Option<RawSymbol> {
    let (addr_str, name) = line.split_once(' ')?;
    if !is_hex_field(addr_str) {
        return None
    }
    let start = Addr::from_str_radix(addr_str, 16).ok()?;

    Some(RawSymbol {
        name: name.to_string(),
        start,
        size: None,
    })
}


/// Parse a complete Mach-O `nm` dump into named address ranges.
pub(crate) fn parse_dump(
    dump: &str,
    window: &LibraryWindow,
    sink: &mut dyn FnMut(&str, Addr, Addr),
) {
    let mut acc = RangeAccumulator::new(window);
    for line in terminated_lines(dump, "\n") {
        if let Some(symbol) = parse_line(line) {
            let () = acc.add(symbol, sink);
        }
    }
    let () = acc.finish(sink);
}


/// A symbol provider reading Mach-O-style `nm` symbol tables.
#[derive(Debug)]
pub struct MacSymbolProvider {
    /// The `nm` binary to spawn.
    nm: PathBuf,
    /// An optional target file system root to load libraries from.
    target_root: Option<String>,
    /// The library to use in place of libraries reported as an `.apk`.
    apk_embedded_library: Option<String>,
}

impl MacSymbolProvider {
    /// Create a provider spawning the given `nm` binary.
    pub fn new(
        nm: PathBuf,
        target_root: Option<String>,
        apk_embedded_library: Option<String>,
    ) -> Self {
        Self {
            nm,
            target_root,
            apk_embedded_library,
        }
    }

    fn load_dump(&self, lib: &str) -> Result<String> {
        let path = effective_lib_path(
            lib,
            self.target_root.as_deref(),
            self.apk_embedded_library.as_deref(),
        );
        let output = Command::new(&self.nm)
            .arg("-n")
            .arg("-f")
            .arg(&path)
            .output()
            .with_context(|| format!("failed to run `{}` on `{path}`", self.nm.display()))?;

        if !output.status.success() {
            let () = warn!(lib = %path, "nm reported failure; library has no symbols");
            return Ok(String::new())
        }
        let () = debug!(lib = %path, bytes = output.stdout.len(), "loaded symbol dump");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SymbolProvider for MacSymbolProvider {
    fn resolve_symbols(
        &mut self,
        window: &LibraryWindow,
        sink: &mut dyn FnMut(&str, Addr, Addr),
    ) -> Result<()> {
        let dump = self.load_dump(&window.name)?;
        let () = parse_dump(&dump, window, sink);
        Ok(())
    }
}
