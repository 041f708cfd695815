//! The structured result of one log replay and its text renderer.

use std::io;
use std::io::Write;

use crate::codemap::Category;
use crate::profile::VmState;


/// Callers contributing less than this share of their parent's ticks
/// are not rendered.
const CALL_PROFILE_CUTOFF_PCT: f64 = 2.0;


/// One row of a flat report section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    /// The entry's reported name.
    pub name: String,
    /// The entry's self ticks.
    pub ticks: u64,
}

/// A node of the bottom-up profile: an entry and the callers observed
/// beneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeavyNode {
    pub name: String,
    /// Samples in which the node's call path was observed.
    pub ticks: u64,
    /// Samples with this entry innermost; only meaningful on roots.
    pub self_ticks: u64,
    pub callers: Vec<HeavyNode>,
}

/// The complete attribution produced by replaying one log.
///
/// The report is a plain value; rendering it to text is a separate
/// concern so that callers can as well consume the data directly.
#[derive(Clone, Debug)]
pub struct Report {
    /// The name of the processed log.
    pub log_name: String,
    /// The number of processed tick samples.
    pub total_ticks: u64,
    /// Samples whose innermost frame resolved to no known code.
    pub unaccounted_ticks: u64,
    /// Samples excluded by the configured state filter.
    pub excluded_ticks: u64,
    /// Whether unaccounted samples were dropped from attribution.
    pub ignore_unknown: bool,
    /// Whether rendering is restricted to the summary.
    pub only_summary: bool,
    /// The rendered depth of the bottom-up profile.
    pub call_graph_size: usize,
    /// Per-library ticks for addresses no named symbol covers.
    pub shared_libraries: Vec<ReportEntry>,
    /// Managed-code entries.
    pub javascript: Vec<ReportEntry>,
    /// Named native symbols.
    pub cpp: Vec<ReportEntry>,
    /// Ticks per VM state, for observed states.
    pub states: Vec<(VmState, u64)>,
    /// Self ticks per code category, for observed categories.
    pub categories: Vec<(Category, u64)>,
    /// The roots of the bottom-up profile.
    pub heavy: Vec<HeavyNode>,
}

impl Report {
    /// The tick count percentages are computed against: unaccounted
    /// samples only participate unless they were ignored.
    fn attributed_total(&self) -> u64 {
        if self.ignore_unknown {
            self.total_ticks - self.unaccounted_ticks
        } else {
            self.total_ticks
        }
    }

    /// Render the report as text.
    ///
    /// The output is byte-for-byte reproducible for a given report.
    pub fn render<W>(&self, w: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        let () = writeln!(
            w,
            "Statistical profiling result from {}, ({} ticks, {} unaccounted, {} excluded).",
            self.log_name, self.total_ticks, self.unaccounted_ticks, self.excluded_ticks
        )?;

        let total = self.attributed_total();
        let lib_ticks = self.shared_libraries.iter().map(|entry| entry.ticks).sum::<u64>();
        let nonlib = total.saturating_sub(lib_ticks);

        if !self.only_summary {
            let () = self.render_section(w, "Shared libraries", &self.shared_libraries, total, None)?;
            let () = self.render_section(w, "JavaScript", &self.javascript, total, Some(nonlib))?;
            let () = self.render_section(w, "C++", &self.cpp, total, Some(nonlib))?;
        }

        let js_ticks = self.javascript.iter().map(|entry| entry.ticks).sum::<u64>();
        let cpp_ticks = self.cpp.iter().map(|entry| entry.ticks).sum::<u64>();
        let gc_ticks = self
            .states
            .iter()
            .find(|(state, _)| *state == VmState::Gc)
            .map(|(_, ticks)| *ticks)
            .unwrap_or(0);

        let () = writeln!(w)?;
        let () = writeln!(w, " [Summary]:")?;
        let () = writeln!(w, "   ticks  total  nonlib   name")?;
        let () = render_line(w, js_ticks, total, Some(nonlib), "JavaScript")?;
        let () = render_line(w, cpp_ticks, total, Some(nonlib), "C++")?;
        let () = render_line(w, gc_ticks, total, Some(nonlib), "GC")?;
        let () = render_line(w, lib_ticks, total, None, "Shared libraries")?;
        let () = render_line(w, self.unaccounted_ticks, total, None, "Unaccounted")?;

        if self.only_summary {
            return Ok(())
        }

        let () = writeln!(w)?;
        let () = writeln!(w, " [VM states]:")?;
        let () = writeln!(w, "   ticks  total  nonlib   name")?;
        for (state, ticks) in &self.states {
            let () = render_line(w, *ticks, total, None, state.label())?;
        }

        let () = writeln!(w)?;
        let () = writeln!(w, " [Code categories]:")?;
        let () = writeln!(w, "   ticks  total  nonlib   name")?;
        for (category, ticks) in &self.categories {
            let () = render_line(w, *ticks, total, None, category.label())?;
        }

        let () = writeln!(w)?;
        let () = writeln!(w, " [Bottom up (heavy) profile]:")?;
        let () = writeln!(
            w,
            "  Note: percentage shows a share of a particular caller in the total"
        )?;
        let () = writeln!(w, "  amount of its parent calls.")?;
        let () = writeln!(
            w,
            "  Callers occupying less than {CALL_PROFILE_CUTOFF_PCT:.1}% are not shown."
        )?;
        let () = writeln!(w)?;
        let () = writeln!(w, "   ticks parent  name")?;
        for root in &self.heavy {
            let () = self.render_heavy(w, root, total, 0)?;
        }
        Ok(())
    }

    fn render_heavy<W>(
        &self,
        w: &mut W,
        node: &HeavyNode,
        parent_ticks: u64,
        depth: usize,
    ) -> io::Result<()>
    where
        W: Write,
    {
        let pct = percent(node.ticks, parent_ticks);
        if pct < CALL_PROFILE_CUTOFF_PCT {
            return Ok(())
        }

        let indent = "  ".repeat(depth);
        let () = writeln!(w, "{:>7}  {:>5.1}%  {}{}", node.ticks, pct, indent, node.name)?;

        if depth < self.call_graph_size {
            for caller in &node.callers {
                let () = self.render_heavy(w, caller, node.ticks, depth + 1)?;
            }
        }
        Ok(())
    }

    fn render_section<W>(
        &self,
        w: &mut W,
        title: &str,
        entries: &[ReportEntry],
        total: u64,
        nonlib: Option<u64>,
    ) -> io::Result<()>
    where
        W: Write,
    {
        let () = writeln!(w)?;
        let () = writeln!(w, " [{title}]:")?;
        let () = writeln!(w, "   ticks  total  nonlib   name")?;
        for entry in entries {
            if entry.ticks == 0 {
                continue
            }
            let () = render_line(w, entry.ticks, total, nonlib, &entry.name)?;
        }
        Ok(())
    }
}


fn percent(ticks: u64, base: u64) -> f64 {
    if base == 0 {
        0.0
    } else {
        ticks as f64 * 100.0 / base as f64
    }
}

fn render_line<W>(
    w: &mut W,
    ticks: u64,
    total: u64,
    nonlib: Option<u64>,
    name: &str,
) -> io::Result<()>
where
    W: Write,
{
    let total_pct = percent(ticks, total);
    let nonlib_col = match nonlib {
        Some(base) => format!("{:>5.1}%", percent(ticks, base)),
        None => " ".repeat(6),
    };
    writeln!(w, "{ticks:>7}  {total_pct:>5.1}%  {nonlib_col}  {name}")
}


/// Sort report entries descending by ticks, then ascending by name,
/// for deterministic output.
pub(crate) fn sort_entries(entries: &mut [ReportEntry]) {
    let () = entries.sort_by(|a, b| b.ticks.cmp(&a.ticks).then_with(|| a.name.cmp(&b.name)));
}

/// Sort heavy nodes recursively with the same order as
/// [`sort_entries`].
pub(crate) fn sort_heavy(nodes: &mut [HeavyNode]) {
    let () = nodes.sort_by(|a, b| b.ticks.cmp(&a.ticks).then_with(|| a.name.cmp(&b.name)));
    for node in nodes {
        let () = sort_heavy(&mut node.callers);
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    fn render_to_string(report: &Report) -> String {
        let mut buf = Vec::new();
        let () = report.render(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample_report() -> Report {
        Report {
            log_name: "test.log".to_string(),
            total_ticks: 4,
            unaccounted_ticks: 1,
            excluded_ticks: 0,
            ignore_unknown: false,
            only_summary: false,
            call_graph_size: 5,
            shared_libraries: vec![ReportEntry {
                name: "lib.so".to_string(),
                ticks: 1,
            }],
            javascript: vec![ReportEntry {
                name: "LazyCompile: Foo".to_string(),
                ticks: 2,
            }],
            cpp: vec![],
            states: vec![(VmState::Js, 3), (VmState::Gc, 1)],
            categories: vec![(Category::Regular, 2), (Category::Native, 1)],
            heavy: vec![HeavyNode {
                name: "LazyCompile: Foo".to_string(),
                ticks: 2,
                self_ticks: 2,
                callers: vec![HeavyNode {
                    name: "bar".to_string(),
                    ticks: 1,
                    self_ticks: 0,
                    callers: vec![],
                }],
            }],
        }
    }

    /// Check that a full report renders with the expected layout,
    /// byte for byte.
    #[test]
    fn full_rendering() {
        let expected = "\
Statistical profiling result from test.log, (4 ticks, 1 unaccounted, 0 excluded).

 [Shared libraries]:
   ticks  total  nonlib   name
      1   25.0%          lib.so

 [JavaScript]:
   ticks  total  nonlib   name
      2   50.0%   66.7%  LazyCompile: Foo

 [C++]:
   ticks  total  nonlib   name

 [Summary]:
   ticks  total  nonlib   name
      2   50.0%   66.7%  JavaScript
      0    0.0%    0.0%  C++
      1   25.0%   33.3%  GC
      1   25.0%          Shared libraries
      1   25.0%          Unaccounted

 [VM states]:
   ticks  total  nonlib   name
      3   75.0%          JS
      1   25.0%          GC

 [Code categories]:
   ticks  total  nonlib   name
      2   50.0%          Regular code
      1   25.0%          Native

 [Bottom up (heavy) profile]:
  Note: percentage shows a share of a particular caller in the total
  amount of its parent calls.
  Callers occupying less than 2.0% are not shown.

   ticks parent  name
      2   50.0%  LazyCompile: Foo
      1   50.0%    bar
";
        assert_eq!(render_to_string(&sample_report()), expected);
    }

    /// Check that the summary-only mode restricts output to the
    /// header and summary.
    #[test]
    fn summary_only_rendering() {
        let mut report = sample_report();
        report.only_summary = true;

        let expected = "\
Statistical profiling result from test.log, (4 ticks, 1 unaccounted, 0 excluded).

 [Summary]:
   ticks  total  nonlib   name
      2   50.0%   66.7%  JavaScript
      0    0.0%    0.0%  C++
      1   25.0%   33.3%  GC
      1   25.0%          Shared libraries
      1   25.0%          Unaccounted
";
        assert_eq!(render_to_string(&report), expected);
    }

    /// Check that ignoring unknown samples removes them from the
    /// percentage base.
    #[test]
    fn ignored_unknown_percentages() {
        let mut report = sample_report();
        report.ignore_unknown = true;

        let rendered = render_to_string(&report);
        // 2 of 3 attributed ticks.
        assert!(rendered.contains("      2   66.7%  100.0%  LazyCompile: Foo"), "{rendered}");
    }

    /// Check the deterministic entry ordering.
    #[test]
    fn entry_sorting() {
        let mut entries = vec![
            ReportEntry { name: "b".to_string(), ticks: 1 },
            ReportEntry { name: "a".to_string(), ticks: 1 },
            ReportEntry { name: "c".to_string(), ticks: 5 },
        ];
        let () = sort_entries(&mut entries);
        let names = entries.iter().map(|entry| entry.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
