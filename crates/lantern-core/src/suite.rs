//! Source of the candidate suite appended to the instrumented unit.

use std::fmt::Write as _;
use std::path::PathBuf;

/// Name of the generated test module.
pub const SUITE_MODULE: &str = "__lantern_suite";

/// One candidate as source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateText {
    pub index: usize,
    /// Statements executed against the instrumented unit.
    pub body: String,
    /// The same statements naming the original items, for the handoff.
    pub fragment: String,
    /// Callee -> return stand-ins synthesized for it.
    pub mock_calls: Vec<(String, usize)>,
}

/// Values baked into the suite's `SuiteConfig` literal.
#[derive(Debug, Clone)]
pub struct SuiteSettings {
    pub collect_window_ms: u64,
    pub max_suite_size: usize,
    pub handoff_path: Option<PathBuf>,
}

/// Append a `#[cfg(test)]` module running every candidate through
/// `lantern_runtime::run_suite`.
pub fn render_suite(
    unit_source: &str,
    use_declarations: &str,
    settings: &SuiteSettings,
    candidates: &[CandidateText],
) -> String {
    let mut out = String::with_capacity(unit_source.len() + candidates.len() * 256);
    out.push_str(unit_source);
    out.push_str("\n\n#[cfg(test)]\n#[allow(unused_imports, unused_mut, unused_variables, clippy::all)]\n");
    let _ = writeln!(out, "mod {SUITE_MODULE} {{");
    out.push_str("    use super::*;\n");
    for line in use_declarations.lines() {
        let _ = writeln!(out, "    {line}");
    }

    out.push_str("\n    #[test]\n    fn lantern_candidates() {\n");
    out.push_str("        let config = ::lantern_runtime::SuiteConfig {\n");
    let _ = writeln!(
        out,
        "            collect_window: ::std::time::Duration::from_millis({}),",
        settings.collect_window_ms
    );
    let _ = writeln!(out, "            max_suite_size: {},", settings.max_suite_size);
    match &settings.handoff_path {
        Some(path) => {
            let _ = writeln!(
                out,
                "            handoff_path: Some(::std::path::PathBuf::from({:?})),",
                path.display().to_string()
            );
        }
        None => out.push_str("            handoff_path: None,\n"),
    }
    out.push_str("            print_records: true,\n        };\n");

    out.push_str("        let candidates = vec![\n");
    for candidate in candidates {
        render_candidate(&mut out, candidate);
    }
    out.push_str("        ];\n");
    out.push_str(
        "        if let Err(err) = ::lantern_runtime::run_suite(config, candidates) {\n\
         \x20           panic!(\"lantern suite failed: {err}\");\n\
         \x20       }\n",
    );
    out.push_str("    }\n}\n");
    out
}

fn render_candidate(out: &mut String, candidate: &CandidateText) {
    let _ = writeln!(
        out,
        "            ::lantern_runtime::Candidate::new({}, {:?}, || {{",
        candidate.index, candidate.fragment
    );
    for line in candidate.body.lines() {
        let _ = writeln!(out, "                {line}");
    }
    if candidate.mock_calls.is_empty() {
        out.push_str("            }),\n");
    } else {
        let mocks: Vec<String> = candidate
            .mock_calls
            .iter()
            .map(|(callee, count)| format!("({callee:?}, {count})"))
            .collect();
        let _ = writeln!(out, "            }})\n            .with_mocks(&[{}]),", mocks.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SuiteSettings {
        SuiteSettings {
            collect_window_ms: 500,
            max_suite_size: 4,
            handoff_path: Some(PathBuf::from("/tmp/handoff.json")),
        }
    }

    fn candidate(index: usize) -> CandidateText {
        CandidateText {
            index,
            body: format!("let _ = parse_lt3({index}i64);"),
            fragment: format!("let _ = parse({index}i64);"),
            mock_calls: Vec::new(),
        }
    }

    #[test]
    fn test_suite_parses() {
        let unit = "fn parse_lt3(n: i64) -> i64 { n }";
        let mut with_mocks = candidate(1);
        with_mocks.mock_calls = vec![("fetch".to_string(), 2)];
        let source = render_suite(
            unit,
            "use std::collections::HashMap;\n",
            &settings(),
            &[candidate(0), with_mocks],
        );

        let file = syn::parse_file(&source).unwrap();
        assert_eq!(file.items.len(), 2);
        assert!(source.contains("Candidate::new(0, \"let _ = parse(0i64);\", || {"));
        assert!(source.contains(".with_mocks(&[(\"fetch\", 2)])"));
        assert!(source.contains("max_suite_size: 4,"));
        assert!(source.contains("from_millis(500)"));
    }

    #[test]
    fn test_fragment_is_escaped() {
        let mut tricky = candidate(0);
        tricky.fragment = "let s = \"a\\b\";\nlet _ = parse(1i64);".to_string();
        let source = render_suite("", "", &settings(), &[tricky]);
        assert!(syn::parse_file(&source).is_ok());
    }

    #[test]
    fn test_no_handoff_path() {
        let mut settings = settings();
        settings.handoff_path = None;
        let source = render_suite("", "", &settings, &[]);
        assert!(source.contains("handoff_path: None,"));
        assert!(syn::parse_file(&source).is_ok());
    }
}
