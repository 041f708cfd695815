//! Parsing of Unix-style `nm` symbol tables.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;
use tracing::warn;

use crate::Addr;
use crate::ErrorExt as _;
use crate::Result;

use super::effective_lib_path;
use super::terminated_lines;
use super::LibraryWindow;
use super::RangeAccumulator;
use super::RawSymbol;
use super::SymbolProvider;


/// Check whether a field looks like one of `nm`'s fixed-width
/// hexadecimal columns.
pub(crate) fn is_hex_field(field: &str) -> bool {
    (8..=16).contains(&field.len()) && field.bytes().all(|b| b.is_ascii_hexdigit())
}


/// Parse a single `nm` output line.
///
/// Lines have the form
///
/// ```text
/// <address> [<size>] <type> <name>
/// ```
///
/// with the size column only present when `nm` knows the symbol's
/// extent. Only code symbols (types `t`, `T`, `w`, `W`) are of
/// interest; anything else, including undefined symbols with a blank
/// address column, parses to `None`.
fn parse_line(line: &str) -> Option<RawSymbol> {
    let (addr_str, rest) = line.split_once(' ')?;
    if !is_hex_field(addr_str) {
        return None
    }
    let start = Addr::from_str_radix(addr_str, 16).ok()?;

    let (size, rest) = match rest.split_once(' ') {
        Some((field, tail)) if is_hex_field(field) => {
            (Some(u64::from_str_radix(field, 16).ok()?), tail)
        }
        _ => (None, rest),
    };

    let (sym_type, name) = rest.split_once(' ')?;
    if !matches!(sym_type, "t" | "T" | "w" | "W") {
        return None
    }

    Some(RawSymbol {
        name: name.to_string(),
        start,
        size,
    })
}


/// Parse a complete Unix `nm` dump into named address ranges.
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


/// A symbol provider reading Unix-style `nm` symbol tables.
#[derive(Debug)]
pub struct UnixSymbolProvider {
    /// The `nm` binary to spawn.
    nm: PathBuf,
    /// An optional target file system root to load libraries from.
    target_root: Option<String>,
    /// The library to use in place of libraries reported as an `.apk`.
    apk_embedded_library: Option<String>,
}

impl UnixSymbolProvider {
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
            .arg("-C")
            .arg("-n")
            .arg("-S")
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

impl SymbolProvider for UnixSymbolProvider {
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


#[cfg(test)]
mod tests {
    use super::*;

    use super::super::tests::collect_ranges;


    /// Check that an executable's symbol table parses to the expected
    /// ranges, with implicit range ends derived from following entries.
    #[test]
    fn executable_symbols() {
        let dump = [
            "         U operator delete[](void*)@@GLIBCXX_3.4",
            "08049790 T _init",
            "08049f50 T _start",
            "08139150 00000b4b t v8::internal::Runtime_StringReplaceRegExpWithString(v8::internal::Arguments)",
            "08139ca0 000003f1 T v8::internal::Runtime::GetElementOrCharAt(v8::internal::Handle<v8::internal::Object>, unsigned int)",
            "0813a0b0 00000855 t v8::internal::Runtime_DebugGetPropertyDetails(v8::internal::Arguments)",
            "0818b220 00000036 W v8::internal::RegExpMacroAssembler::CheckPosition(int, v8::internal::Label*)",
            "         w __gmon_start__",
            "081f08a0 00000004 B stdout\n",
        ]
        .join("\n");
        let window = LibraryWindow {
            name: "shell".to_string(),
            start: 0x08048000,
            end: 0x081ee000,
            slide: 0,
        };

        let ranges = collect_ranges(|sink| parse_dump(&dump, &window, sink));
        assert_eq!(
            ranges,
            vec![
                ("_init".to_string(), 0x08049790, 0x08049f50),
                ("_start".to_string(), 0x08049f50, 0x08139150),
                (
                    "v8::internal::Runtime_StringReplaceRegExpWithString(v8::internal::Arguments)"
                        .to_string(),
                    0x08139150,
                    0x08139150 + 0xb4b
                ),
                (
                    "v8::internal::Runtime::GetElementOrCharAt(v8::internal::Handle<v8::internal::Object>, unsigned int)"
                        .to_string(),
                    0x08139ca0,
                    0x08139ca0 + 0x3f1
                ),
                (
                    "v8::internal::Runtime_DebugGetPropertyDetails(v8::internal::Arguments)"
                        .to_string(),
                    0x0813a0b0,
                    0x0813a0b0 + 0x855
                ),
                (
                    "v8::internal::RegExpMacroAssembler::CheckPosition(int, v8::internal::Label*)"
                        .to_string(),
                    0x0818b220,
                    0x0818b220 + 0x36
                ),
            ]
        );
    }

    /// Check that library symbols with dump-relative addresses are
    /// relocated to the library's load address and that same-address
    /// aliases collapse to the first name.
    #[test]
    fn library_symbols() {
        let dump = [
            "000162a0 00000005 T __libc_init_first",
            "0002a5f0 0000002d T __isnan",
            "0002a5f0 0000002d W isnan",
            "0002aaa0 0000000d W scalblnf",
            "0002aaa0 0000000d W scalbnf",
            "0011a340 00000048 T __libc_thread_freeres",
            "00128860 00000024 R _itoa_lower_digits\n",
        ]
        .join("\n");
        let window = LibraryWindow {
            name: "libc".to_string(),
            start: 0xf7c5c000,
            end: 0xf7da5000,
            slide: 0,
        };

        let base = 0xf7c5c000u64;
        let ranges = collect_ranges(|sink| parse_dump(&dump, &window, sink));
        assert_eq!(
            ranges,
            vec![
                ("__libc_init_first".to_string(), base + 0x162a0, base + 0x162a0 + 0x5),
                ("__isnan".to_string(), base + 0x2a5f0, base + 0x2a5f0 + 0x2d),
                ("scalblnf".to_string(), base + 0x2aaa0, base + 0x2aaa0 + 0xd),
                (
                    "__libc_thread_freeres".to_string(),
                    base + 0x11a340,
                    base + 0x11a340 + 0x48
                ),
            ]
        );
    }

    /// Check an Android-style dump with zero-length mapping symbols,
    /// exact duplicates, and an all-zero size column.
    #[test]
    fn android_symbols() {
        let dump = [
            "00000000013a1088 0000000000000224 t v8::internal::interpreter::BytecodeGenerator::BytecodeGenerator(v8::internal::UnoptimizedCompilationInfo*)",
            "00000000013a1088 0000000000000224 t v8::internal::interpreter::BytecodeGenerator::BytecodeGenerator(v8::internal::UnoptimizedCompilationInfo*)",
            "00000000013a12ac t $x.4",
            "00000000013a12ac 00000000000000d0 t v8::internal::interpreter::BytecodeGenerator::FinalizeBytecode(v8::internal::Isolate*, v8::internal::Handle<v8::internal::Script>)",
            "00000000013a137c t $x.5",
            "00000000013a137c 0000000000000528 t v8::internal::interpreter::BytecodeGenerator::AllocateDeferredConstants(v8::internal::Isolate*, v8::internal::Handle<v8::internal::Script>)",
            "00000000013a1578 N $d.46",
            "00000000013a18a4 t $x.6",
            "00000000013a18a4 0000000000000 t v8::internal::interpreter::BytecodeGenerator::GlobalDeclarationsBuilder::AllocateDeclarations(v8::internal::UnoptimizedCompilationInfo*, v8::internal::Handle<v8::internal::Script>, v8::internal::Isolate*)",
            "00000000013a19e0 t $x.7",
            "00000000013a19e0 0000000000000244 t v8::internal::interpreter::BytecodeGenerator::GenerateBytecode(unsigned long)",
            "00000000013a1a88 N $d.7",
            "00000000013a1ac8 N $d.5",
            "00000000013a1af8 N $d.35",
            "00000000013a1c24 t $x.8",
            "00000000013a1c24 000000000000009c t v8::internal::interpreter::BytecodeGenerator::ContextScope::ContextScope(v8::internal::interpreter::BytecodeGenerator*, v8::internal::Scope*)\n",
        ]
        .join("\n");
        let window = LibraryWindow {
            name: "libmonochrome".to_string(),
            start: 0xf7c5c000,
            end: 0xf9c5c000,
            slide: 0,
        };

        let base = 0xf7c5c000u64;
        let ranges = collect_ranges(|sink| parse_dump(&dump, &window, sink));
        let names = ranges.iter().map(|(name, ..)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "v8::internal::interpreter::BytecodeGenerator::BytecodeGenerator(v8::internal::UnoptimizedCompilationInfo*)",
                "v8::internal::interpreter::BytecodeGenerator::FinalizeBytecode(v8::internal::Isolate*, v8::internal::Handle<v8::internal::Script>)",
                "v8::internal::interpreter::BytecodeGenerator::AllocateDeferredConstants(v8::internal::Isolate*, v8::internal::Handle<v8::internal::Script>)",
                "v8::internal::interpreter::BytecodeGenerator::GlobalDeclarationsBuilder::AllocateDeclarations(v8::internal::UnoptimizedCompilationInfo*, v8::internal::Handle<v8::internal::Script>, v8::internal::Isolate*)",
                "v8::internal::interpreter::BytecodeGenerator::GenerateBytecode(unsigned long)",
                "v8::internal::interpreter::BytecodeGenerator::ContextScope::ContextScope(v8::internal::interpreter::BytecodeGenerator*, v8::internal::Scope*)",
            ]
        );
        let bounds = ranges.iter().map(|&(_, start, end)| (start, end)).collect::<Vec<_>>();
        assert_eq!(
            bounds,
            vec![
                (base + 0x13a1088, base + 0x13a1088 + 0x224),
                (base + 0x13a12ac, base + 0x13a12ac + 0xd0),
                (base + 0x13a137c, base + 0x13a137c + 0x528),
                // The all-zero size column carries no extent; the range
                // is inferred from the next mapping symbol.
                (base + 0x13a18a4, base + 0x13a18a4 + 0x13c),
                (base + 0x13a19e0, base + 0x13a19e0 + 0x244),
                (base + 0x13a1c24, base + 0x13a1c24 + 0x9c),
            ]
        );
    }

    /// Make sure that parsing is idempotent: repeated parses of the
    /// same dump yield the same ordered ranges.
    #[test]
    fn parse_idempotence() {
        let dump = "08049790 T _init\n08049f50 T _start\n08139150 00000b4b t helper\n";
        let window = LibraryWindow {
            name: "shell".to_string(),
            start: 0x08048000,
            end: 0x081ee000,
            slide: 0,
        };

        let first = collect_ranges(|sink| parse_dump(dump, &window, sink));
        let second = collect_ranges(|sink| parse_dump(dump, &window, sink));
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    /// Check that an empty or garbage dump parses to zero entries.
    #[test]
    fn degenerate_dumps() {
        let window = LibraryWindow {
            name: "libnone".to_string(),
            start: 0x1000,
            end: 0x2000,
            slide: 0,
        };

        let ranges = collect_ranges(|sink| parse_dump("", &window, sink));
        assert!(ranges.is_empty(), "{ranges:?}");

        let ranges = collect_ranges(|sink| parse_dump("complete garbage\nmore\n", &window, sink));
        assert!(ranges.is_empty(), "{ranges:?}");
    }
}
