//! Replay of profiler logs into an attributed profile.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::codemap::Category;
use crate::codemap::CodeEntry;
use crate::codemap::CodeMap;
use crate::logreader::split_fields;
use crate::profile::Profile;
use crate::profile::ResolvedFrame;
use crate::profile::Section;
use crate::profile::VmState;
use crate::report::sort_entries;
use crate::report::sort_heavy;
use crate::report::HeavyNode;
use crate::report::Report;
use crate::report::ReportEntry;
use crate::symdump::LibraryWindow;
use crate::symdump::Platform;
use crate::symdump::SymbolProvider;
use crate::util::find_match_or_lower_bound_by_key;
use crate::util::parse_hex_addr;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;


/// The name unresolvable innermost frames are attributed to.
const UNKNOWN_ENTRY: &str = "UNKNOWN";


/// A time window over sample timestamps, in microseconds, with either
/// endpoint open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// The first timestamp included, if bounded.
    pub start: Option<u64>,
    /// The last timestamp included, if bounded.
    pub end: Option<u64>,
}

impl TimeRange {
    /// Check whether `timestamp` falls into the window.
    pub fn contains(&self, timestamp: u64) -> bool {
        self.start.map_or(true, |start| timestamp >= start)
            && self.end.map_or(true, |end| timestamp <= end)
    }
}

impl FromStr for TimeRange {
    type Err = Error;

    /// Parse a range of the form `start,end`, where either endpoint
    /// may be `auto` to leave it open.
    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once(',')
            .ok_or_invalid_input(|| format!("time range `{s}` is not of the form `start,end`"))?;
        let parse_endpoint = |part: &str| -> Result<Option<u64>> {
            if part == "auto" {
                return Ok(None)
            }
            part.parse()
                .map(Some)
                .map_err(|_err| Error::with_invalid_input(format!("invalid time range endpoint `{part}`")))
        };
        Ok(Self {
            start: parse_endpoint(start)?,
            end: parse_endpoint(end)?,
        })
    }
}


/// The immutable configuration of one processing run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Report inline-cache variants as distinct entries instead of one
    /// aggregate.
    pub separate_ic: bool,
    /// Report bytecode handlers as distinct entries.
    pub separate_bytecodes: bool,
    /// Report builtins as distinct entries.
    pub separate_builtins: bool,
    /// Report code stubs as distinct entries.
    pub separate_stubs: bool,
    /// Report baseline handlers distinctly from other builtins.
    pub separate_baseline_handlers: bool,
    /// Drop samples with an unresolvable innermost frame from
    /// attribution (they still count towards the grand total).
    pub ignore_unknown: bool,
    /// Only attribute samples taken in this VM state.
    pub state_filter: Option<VmState>,
    /// The rendered depth of the bottom-up profile.
    pub call_graph_size: usize,
    /// The platform whose toolchain produced the symbol dumps.
    pub platform: Platform,
    /// The symbol-listing binary to spawn.
    pub nm: PathBuf,
    /// An optional target file system root to load libraries from.
    pub target_root: Option<String>,
    /// The library to use in place of libraries reported as an `.apk`.
    pub apk_embedded_library: Option<String>,
    /// The time window to restrict samples to.
    pub range: TimeRange,
    /// Restrict report rendering to the summary.
    pub only_summary: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            separate_ic: false,
            separate_bytecodes: false,
            separate_builtins: true,
            separate_stubs: true,
            separate_baseline_handlers: false,
            ignore_unknown: false,
            state_filter: None,
            call_graph_size: 5,
            platform: Platform::Auto,
            nm: PathBuf::from("nm"),
            target_root: None,
            apk_embedded_library: None,
            range: TimeRange::default(),
            only_summary: false,
        }
    }
}

impl Config {
    /// Whether entries of `category` are reported as distinct entries.
    fn separates(&self, category: Category) -> bool {
        match category {
            Category::Ic => self.separate_ic,
            Category::Bytecode => self.separate_bytecodes,
            Category::Builtin => self.separate_builtins,
            Category::Stub => self.separate_stubs,
            Category::Baseline => self.separate_baseline_handlers,
            Category::Regular | Category::Native => true,
        }
    }

    /// Derive the code category from a `code-creation` record's kind
    /// tag.
    fn classify(&self, kind_tag: &str, name: &str) -> Category {
        match kind_tag {
            "LoadIC" | "StoreIC" | "KeyedLoadIC" | "KeyedStoreIC" | "CallIC" | "KeyedCallIC"
            | "LoadGlobalIC" | "StoreGlobalIC" | "Handler" => Category::Ic,
            "BytecodeHandler" => Category::Bytecode,
            "Builtin" if self.separate_baseline_handlers && name.contains("Baseline") => {
                Category::Baseline
            }
            "Builtin" => Category::Builtin,
            "Stub" => Category::Stub,
            _ => Category::Regular,
        }
    }
}


#[derive(Clone, Copy, Debug, Default)]
struct TickCounts {
    /// Processed samples.
    total: u64,
    /// Samples rejected by the state filter.
    excluded: u64,
    /// Samples whose innermost frame resolved to no known code.
    unaccounted: u64,
}


/// The single-pass state machine replaying a profiler log.
///
/// Log records are processed strictly in file order; code-lifecycle
/// records mutate the address registry and tick records are resolved
/// against it and handed to the statistics aggregator.
#[derive(Debug)]
pub struct TickProcessor {
    config: Config,
    provider: Box<dyn SymbolProvider>,
    code_map: CodeMap,
    /// All library windows seen, in log order.
    libraries: Vec<LibraryWindow>,
    /// An index of `(window start, library)` sorted by start address,
    /// for attributing addresses that no named symbol covers.
    library_index: Vec<(Addr, usize)>,
    profile: Profile,
    ticks: TickCounts,
    /// The processor's notion of elapsed time, in microseconds.
    current_time: u64,
}

impl TickProcessor {
    /// Create a processor for one run.
    pub fn new(config: Config, provider: Box<dyn SymbolProvider>) -> Self {
        Self {
            config,
            provider,
            code_map: CodeMap::new(),
            libraries: Vec::new(),
            library_index: Vec::new(),
            profile: Profile::new(),
            ticks: TickCounts::default(),
            current_time: 0,
        }
    }

    /// Replay the log file at `path`.
    pub fn process_log_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("failed to open log file `{}`", path.display()))?;
        self.process_log(BufReader::new(file))
    }

    /// Replay a complete log.
    pub fn process_log<R>(&mut self, mut reader: R) -> Result<()>
    where
        R: BufRead,
    {
        let mut line = String::new();
        loop {
            let () = line.clear();
            let count = reader
                .read_line(&mut line)
                .context("failed to read log record")?;
            if count == 0 {
                break
            }
            let () = self.process_record(line.trim_end_matches(['\r', '\n']))?;
        }
        let () = debug!(
            elapsed_us = self.current_time,
            ticks = self.ticks.total,
            "log replay complete"
        );
        Ok(())
    }

    /// Process a single log record.
    ///
    /// Malformed records are skipped; unrecognized record kinds are
    /// ignored. Only a failure to acquire a library's symbols is an
    /// error.
    pub fn process_record(&mut self, record: &str) -> Result<()> {
        if record.is_empty() {
            return Ok(())
        }
        let Some(fields) = split_fields(record) else {
            let () = warn!(record, "skipping malformed log record");
            return Ok(())
        };
        let Some((kind, args)) = fields.split_first() else {
            return Ok(())
        };

        let handled = match kind.as_str() {
            "shared-library" => return self.process_shared_library(args),
            "code-creation" => self.process_code_creation(args),
            "code-move" => self.process_code_move(args),
            "code-delete" => self.process_code_delete(args),
            "tick" => self.process_tick(args),
            "current-time" => self.process_current_time(args),
            _ => {
                let () = trace!(kind = kind.as_str(), "ignoring unrecognized log record");
                Some(())
            }
        };
        if handled.is_none() {
            let () = warn!(record, "skipping malformed log record");
        }
        Ok(())
    }

    fn process_shared_library(&mut self, args: &[String]) -> Result<()> {
        let window = (|| {
            Some(LibraryWindow {
                name: args.first()?.clone(),
                start: parse_hex_addr(args.get(1)?)?,
                end: parse_hex_addr(args.get(2)?)?,
                slide: parse_hex_addr(args.get(3)?)? as i64,
            })
        })();
        let Some(window) = window else {
            let () = warn!("skipping malformed shared-library record");
            return Ok(())
        };

        let index = self.libraries.len();
        let mut added = 0usize;
        let Self {
            provider, code_map, ..
        } = self;
        let mut sink = |name: &str, start: Addr, end: Addr| {
            let () = code_map.insert(
                start,
                CodeEntry {
                    name: name.to_string(),
                    end,
                    category: Category::Native,
                    library: Some(index),
                },
            );
            added += 1;
        };
        let () = provider
            .resolve_symbols(&window, &mut sink)
            .with_context(|| format!("failed to resolve native symbols of `{}`", window.name))?;
        let () = debug!(lib = %window.name, symbols = added, "loaded shared library");

        let at = self
            .library_index
            .partition_point(|(start, _)| *start < window.start);
        let () = self.library_index.insert(at, (window.start, index));
        let () = self.libraries.push(window);
        Ok(())
    }

    fn process_code_creation(&mut self, args: &[String]) -> Option<()> {
        let kind_tag = args.first()?;
        let _other_tag = args.get(1)?;
        let start = parse_hex_addr(args.get(2)?)?;
        let size = parse_hex_addr(args.get(3)?)?;
        let name = args.get(4)?;

        let category = self.config.classify(kind_tag, name);
        let name = if self.config.separates(category) {
            format!("{kind_tag}: {name}")
        } else {
            category.label().to_string()
        };
        let () = trace!(name = %name, start, size, "code created");
        let () = self.code_map.insert(
            start,
            CodeEntry {
                name,
                end: start.wrapping_add(size),
                category,
                library: None,
            },
        );
        Some(())
    }

    fn process_code_move(&mut self, args: &[String]) -> Option<()> {
        let from = parse_hex_addr(args.first()?)?;
        let to = parse_hex_addr(args.get(1)?)?;
        let () = trace!(from, to, "code moved");
        let () = self.code_map.move_code(from, to);
        Some(())
    }

    fn process_code_delete(&mut self, args: &[String]) -> Option<()> {
        let addr = parse_hex_addr(args.first()?)?;
        let () = trace!(addr, "code deleted");
        let () = self.code_map.remove_code(addr);
        Some(())
    }

    fn process_current_time(&mut self, args: &[String]) -> Option<()> {
        let timestamp = args.first()?.parse().ok()?;
        self.current_time = timestamp;
        Some(())
    }

    fn process_tick(&mut self, args: &[String]) -> Option<()> {
        let pc = parse_hex_addr(args.first()?)?;
        let timestamp = args.get(1)?.parse().ok()?;
        let state = VmState::from_tag(args.get(2)?.parse().ok()?);
        self.current_time = timestamp;

        if !self.config.range.contains(timestamp) {
            return Some(())
        }
        if let Some(filter) = self.config.state_filter {
            if filter != state {
                self.ticks.excluded += 1;
                return Some(())
            }
        }
        self.ticks.total += 1;

        let mut frames = Vec::with_capacity(args.len() - 2);
        match self.resolve(pc) {
            Some(frame) => frames.push(frame),
            None => {
                self.ticks.unaccounted += 1;
                if self.config.ignore_unknown {
                    return Some(())
                }
                let () = frames.push(ResolvedFrame {
                    name: UNKNOWN_ENTRY.to_string(),
                    section: Section::Unknown,
                    category: None,
                });
            }
        }

        for field in args.iter().skip(3) {
            let Some(addr) = parse_hex_addr(field) else {
                continue
            };
            // Unresolvable caller frames are silently skipped; only
            // the innermost frame warrants an unknown entry.
            if let Some(frame) = self.resolve(addr) {
                let () = frames.push(frame);
            }
        }

        let () = self.profile.record_sample(&frames, state);
        Some(())
    }

    /// Resolve an address to the entry containing it, falling back to
    /// the owning library for addresses no named symbol covers.
    fn resolve(&self, addr: Addr) -> Option<ResolvedFrame> {
        if let Some(entry) = self.code_map.lookup(addr) {
            let section = if entry.category == Category::Native {
                Section::Cpp
            } else {
                Section::JavaScript
            };
            return Some(ResolvedFrame {
                name: entry.name.clone(),
                section,
                category: Some(entry.category),
            })
        }

        let window = self.lookup_library(addr)?;
        Some(ResolvedFrame {
            name: window.name.clone(),
            section: Section::SharedLibrary,
            category: Some(Category::Native),
        })
    }

    fn lookup_library(&self, addr: Addr) -> Option<&LibraryWindow> {
        let idx = find_match_or_lower_bound_by_key(&self.library_index, addr, |(start, _)| *start)?;
        let (_, library) = self.library_index.get(idx)?;
        let window = self.libraries.get(*library)?;
        (addr < window.end).then_some(window)
    }

    /// Conclude the run, producing the final report.
    pub fn into_report(self, log_name: &str) -> Report {
        let mut shared_libraries = Vec::new();
        let mut javascript = Vec::new();
        let mut cpp = Vec::new();
        for (name, stats) in self.profile.entries() {
            let entry = ReportEntry {
                name: name.to_string(),
                ticks: stats.self_ticks,
            };
            match stats.section {
                Some(Section::JavaScript) => javascript.push(entry),
                Some(Section::Cpp) => cpp.push(entry),
                Some(Section::SharedLibrary) => shared_libraries.push(entry),
                Some(Section::Unknown) | None => (),
            }
        }
        let () = sort_entries(&mut shared_libraries);
        let () = sort_entries(&mut javascript);
        let () = sort_entries(&mut cpp);

        let mut states = VmState::ALL
            .iter()
            .filter_map(|state| {
                let ticks = self.profile.state_ticks(*state);
                (ticks > 0).then_some((*state, ticks))
            })
            .collect::<Vec<_>>();
        let () = states.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.label().cmp(b.0.label())));

        let mut categories = Category::ALL
            .iter()
            .filter_map(|category| {
                let ticks = self.profile.category_ticks(*category);
                (ticks > 0).then_some((*category, ticks))
            })
            .collect::<Vec<_>>();
        let () =
            categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.label().cmp(b.0.label())));

        let tree = self.profile.tree();
        let mut heavy = tree
            .roots()
            .map(|root| {
                fn convert(
                    tree: &crate::profile::CallTree,
                    node: &crate::profile::CallNode,
                ) -> HeavyNode {
                    HeavyNode {
                        name: node.name.clone(),
                        ticks: node.total_ticks,
                        self_ticks: node.self_ticks,
                        callers: tree.callers(node).map(|caller| convert(tree, caller)).collect(),
                    }
                }
                convert(tree, root)
            })
            .collect::<Vec<_>>();
        let () = sort_heavy(&mut heavy);

        Report {
            log_name: log_name.to_string(),
            total_ticks: self.ticks.total,
            unaccounted_ticks: self.ticks.unaccounted,
            excluded_ticks: self.ticks.excluded,
            ignore_unknown: self.config.ignore_unknown,
            only_summary: self.config.only_summary,
            call_graph_size: self.config.call_graph_size,
            shared_libraries,
            javascript,
            cpp,
            states,
            categories,
            heavy,
        }
    }
}
