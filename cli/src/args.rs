use std::path::PathBuf;
use std::str::FromStr as _;

use clap::ArgAction;
use clap::Parser;

use tickproc::symdump::Platform;
use tickproc::Config;
use tickproc::TimeRange;
use tickproc::VmState;


/// A command line utility for processing runtime profiler tick logs.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// The tick log file to process.
    #[arg(default_value = "ticks.log")]
    pub log_file: PathBuf,
    /// Report inline-cache variants as distinct entries.
    #[arg(
        long,
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub separate_ic: bool,
    /// Report bytecode handlers as distinct entries.
    #[arg(
        long,
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub separate_bytecodes: bool,
    /// Report builtins as distinct entries.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub separate_builtins: bool,
    /// Report code stubs as distinct entries.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub separate_stubs: bool,
    /// Report baseline handlers distinctly from other builtins.
    #[arg(
        long,
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub separate_baseline_handlers: bool,
    /// Drop samples hitting unknown code from attribution.
    #[arg(long)]
    pub ignore_unknown: bool,
    /// Only attribute samples taken while executing managed code.
    #[arg(long, group = "state")]
    pub js: bool,
    /// Only attribute samples taken while garbage collecting.
    #[arg(long, group = "state")]
    pub gc: bool,
    /// Only attribute samples taken while compiling.
    #[arg(long, group = "state")]
    pub compiler: bool,
    /// Only attribute samples taken in other runtime states.
    #[arg(long, group = "state")]
    pub other: bool,
    /// Only attribute samples taken while running external code.
    #[arg(long, group = "state")]
    pub external: bool,
    /// Only attribute samples taken while idling.
    #[arg(long, group = "state")]
    pub idle: bool,
    /// The number of caller levels shown in the bottom-up profile.
    #[arg(long, default_value_t = 5)]
    pub call_graph_size: usize,
    /// Expect Unix-style `nm` symbol dumps.
    #[arg(long, group = "platform")]
    pub unix: bool,
    /// Expect Mach-O-style `nm` symbol dumps.
    #[arg(long, group = "platform")]
    pub mac: bool,
    /// Expect Windows linker MAP files.
    #[arg(long, group = "platform")]
    pub windows: bool,
    /// The symbol-listing binary to spawn.
    #[arg(long, default_value = "nm")]
    pub nm: PathBuf,
    /// A target file system root to load libraries from.
    #[arg(long)]
    pub target: Option<String>,
    /// The library to use for libraries reported as an `.apk`.
    #[arg(long)]
    pub apk_embedded_library: Option<String>,
    /// Restrict processing to a time window, given as
    /// `start,end` in microseconds; either endpoint may be `auto`.
    #[arg(long, default_value = "auto,auto", value_parser = TimeRange::from_str)]
    pub range: TimeRange,
    /// Only print the summary section of the report.
    #[arg(long)]
    pub only_summary: bool,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    fn state_filter(&self) -> Option<VmState> {
        if self.js {
            Some(VmState::Js)
        } else if self.gc {
            Some(VmState::Gc)
        } else if self.compiler {
            Some(VmState::Compiler)
        } else if self.other {
            Some(VmState::Other)
        } else if self.external {
            Some(VmState::External)
        } else if self.idle {
            Some(VmState::Idle)
        } else {
            None
        }
    }

    fn platform(&self) -> Platform {
        if self.unix {
            Platform::Unix
        } else if self.mac {
            Platform::Mac
        } else if self.windows {
            Platform::Windows
        } else {
            Platform::Auto
        }
    }

    /// Convert the parsed arguments into the engine's configuration.
    pub fn config(&self) -> Config {
        Config {
            separate_ic: self.separate_ic,
            separate_bytecodes: self.separate_bytecodes,
            separate_builtins: self.separate_builtins,
            separate_stubs: self.separate_stubs,
            separate_baseline_handlers: self.separate_baseline_handlers,
            ignore_unknown: self.ignore_unknown,
            state_filter: self.state_filter(),
            call_graph_size: self.call_graph_size,
            platform: self.platform(),
            nm: self.nm.clone(),
            target_root: self.target.clone(),
            apk_embedded_library: self.apk_embedded_library.clone(),
            range: self.range,
            only_summary: self.only_summary,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that omitting all arguments yields the documented default
    /// configuration.
    #[test]
    fn default_arguments() {
        let args = Args::try_parse_from(["tickproc"]).unwrap();
        assert_eq!(args.log_file, PathBuf::from("ticks.log"));
        assert_eq!(args.config(), Config::default());
    }

    /// Check that an unrecognized flag is a parse failure.
    #[test]
    fn unknown_flag() {
        let result = Args::try_parse_from(["tickproc", "--unknown", "badlog.log"]);
        assert!(result.is_err(), "{result:?}");
    }

    /// Check platform selection together with a log file.
    #[test]
    fn platform_and_log_file() {
        let args = Args::try_parse_from(["tickproc", "--windows", "winlog.log"]).unwrap();
        assert_eq!(args.config().platform, Platform::Windows);
        assert_eq!(args.log_file, PathBuf::from("winlog.log"));

        let result = Args::try_parse_from(["tickproc", "--windows", "--mac"]);
        assert!(result.is_err(), "{result:?}");
    }

    /// Check state filters combined with explicit separation toggles.
    #[test]
    fn state_filter_and_toggles() {
        let args = Args::try_parse_from(["tickproc", "--gc", "--separate-ic=true"]).unwrap();
        let config = args.config();
        assert_eq!(config.state_filter, Some(VmState::Gc));
        assert!(config.separate_ic);

        let args = Args::try_parse_from(["tickproc", "--gc", "--separate-ic=false"]).unwrap();
        let config = args.config();
        assert_eq!(config.state_filter, Some(VmState::Gc));
        assert!(!config.separate_ic);

        let result = Args::try_parse_from(["tickproc", "--gc", "--js"]);
        assert!(result.is_err(), "{result:?}");
    }

    /// Check the `nm` override.
    #[test]
    fn nm_override() {
        let args = Args::try_parse_from(["tickproc", "--nm=mn", "nmlog.log"]).unwrap();
        assert_eq!(args.config().nm, PathBuf::from("mn"));
        assert_eq!(args.log_file, PathBuf::from("nmlog.log"));
    }

    /// Check time range parsing through the command line.
    #[test]
    fn range_argument() {
        let args = Args::try_parse_from(["tickproc", "--range", "100,auto"]).unwrap();
        assert_eq!(args.config().range.start, Some(100));
        assert_eq!(args.config().range.end, None);

        let result = Args::try_parse_from(["tickproc", "--range", "nonsense"]);
        assert!(result.is_err(), "{result:?}");
    }
}
