//! Parsing of Windows linker MAP files.
//!
//! MAP files carry two tables of interest, "Publics by Value" and an
//! optional trailing "Static symbols" table, both with records of the
//! form
//!
//! ```text
//!  0001:00000780       ?RunMain@@YAHHQAPAD@Z      00401780 f   shell.obj
//! ```
//!
//! Only segment-0001 (code) records matter; table headers and records
//! in other segments simply fail to parse. The `___ImageBase` record is
//! used to detect a MAP file that was generated for a different module
//! than the one being resolved.

use std::fs;
use std::path::PathBuf;

use nom::bytes::complete::tag;
use nom::bytes::complete::take_while1;
use nom::bytes::complete::take_while_m_n;
use nom::character::complete::space1;
use nom::combinator::map_res;
use nom::error::VerboseError;
use nom::IResult;

use tracing::debug;

use crate::demangle::unmangle_msvc;
use crate::Addr;
use crate::Result;

use super::effective_lib_path;
use super::terminated_lines;
use super::LibraryWindow;
use super::RangeAccumulator;
use super::RawSymbol;
use super::SymbolProvider;


/// The image base the Windows linker assigns to executables. This is
/// almost a constant on Windows.
const EXE_IMAGE_BASE: Addr = 0x00400000;


/// Match one of the MAP file's fixed eight-digit hexadecimal columns.
fn hex_column(input: &str) -> IResult<&str, Addr, VerboseError<&str>> {
    map_res(
        take_while_m_n(8, 8, |c: char| c.is_ascii_hexdigit()),
        |s: &str| Addr::from_str_radix(s, 16),
    )(input)
}

/// Check for a character that can appear in a decorated symbol name.
fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '?' | '@' | '$')
}

/// Matches the `___ImageBase` record, yielding the module's image base.
fn image_base_line(input: &str) -> IResult<&str, Addr, VerboseError<&str>> {
    let (input, _) = space1(input)?;
    let (input, _) = tag("0000:00000000")(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag("___ImageBase")(input)?;
    let (input, _) = space1(input)?;
    let (input, base) = hex_column(input)?;
    Ok((input, base))
}

/// Matches a code-segment symbol record, yielding the decorated name
/// and the symbol's `Rva+Base` address.
fn symbol_line(input: &str) -> IResult<&str, (&str, Addr), VerboseError<&str>> {
    let (input, _) = space1(input)?;
    let (input, _) = tag("0001:")(input)?;
    let (input, _offset) = hex_column(input)?;
    let (input, _) = space1(input)?;
    let (input, name) = take_while1(is_symbol_char)(input)?;
    let (input, _) = space1(input)?;
    let (input, addr) = hex_column(input)?;
    Ok((input, (name, addr)))
}


/// Parse a complete MAP file dump into named address ranges.
///
/// `module_is_exe` states whether the module being resolved is the main
/// executable; a MAP file whose image base does not agree belongs to a
/// different module and contributes no entries.
pub(crate) fn parse_dump(
    dump: &str,
    module_is_exe: bool,
    window: &LibraryWindow,
    sink: &mut dyn FnMut(&str, Addr, Addr),
) {
    let mut acc = RangeAccumulator::new(window);
    for line in terminated_lines(dump, "\r\n") {
        if let Ok((_rest, base)) = image_base_line(line) {
            if module_is_exe != (base == EXE_IMAGE_BASE) {
                break
            }
            continue
        }
        if let Ok((_rest, (name, addr))) = symbol_line(line) {
            let name = unmangle_msvc(name);
            let () = acc.add(
                RawSymbol {
                    name: name.into_owned(),
                    start: addr,
                    size: None,
                },
                sink,
            );
        }
    }
    let () = acc.finish(sink);
}


/// A symbol provider reading Windows linker MAP files.
#[derive(Debug)]
pub struct WindowsMapProvider {
    /// An optional target file system root to load MAP files from.
    target_root: Option<String>,
}

impl WindowsMapProvider {
    /// Create a provider locating MAP files next to their modules.
    pub fn new(target_root: Option<String>) -> Self {
        Self { target_root }
    }

    /// Split a module path into its stem and extension.
    fn module_parts(lib: &str) -> Option<(&str, &str)> {
        let (stem, ext) = lib.rsplit_once('.')?;
        (!stem.is_empty()).then_some((stem, ext))
    }
}

impl SymbolProvider for WindowsMapProvider {
    fn resolve_symbols(
        &mut self,
        window: &LibraryWindow,
        sink: &mut dyn FnMut(&str, Addr, Addr),
    ) -> Result<()> {
        let lib = effective_lib_path(&window.name, self.target_root.as_deref(), None);
        let Some((stem, ext)) = Self::module_parts(&lib) else {
            // A module without an extension has no discoverable MAP
            // file and, consequently, no symbols.
            return Ok(())
        };
        let map_path = PathBuf::from(format!("{stem}.map"));

        // A missing MAP file means the library has no symbols, not
        // that processing failed.
        let dump = match fs::read_to_string(&map_path) {
            Ok(dump) => dump,
            Err(err) => {
                let () = debug!(
                    map = %map_path.display(),
                    error = %err,
                    "no MAP file; module has no symbols"
                );
                return Ok(())
            }
        };

        let module_is_exe = ext.eq_ignore_ascii_case("exe");
        let () = parse_dump(&dump, module_is_exe, window, sink);
        Ok(())
    }
}
