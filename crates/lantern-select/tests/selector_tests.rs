use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use lantern_ir::{
    CandidateSource, CoverageEvent, FailureDetail, FunctionIdentity, ProbeSite,
};
use lantern_select::{Selector, StopReason, Verdict};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn hits(sites: &[ProbeSite]) -> BTreeMap<ProbeSite, u32> {
    sites.iter().map(|s| (*s, 1)).collect()
}

fn completed(name: &str, candidate: usize, sites: &[ProbeSite]) -> CoverageEvent {
    CoverageEvent::completed(
        FunctionIdentity::new(name),
        "src/lib.rs",
        Some(candidate),
        &hits(sites),
        6,
    )
}

fn panicked(name: &str, candidate: usize, sites: &[ProbeSite]) -> CoverageEvent {
    CoverageEvent::failed(
        FunctionIdentity::new(name),
        "src/lib.rs",
        Some(candidate),
        &hits(sites),
        6,
        FailureDetail {
            message: "index out of bounds".into(),
            stack: "at parse".into(),
        },
    )
}

#[test]
fn test_novelty_selection_abaca() {
    init_logger();
    let a = [0, 1];
    let b = [2];
    let c = [3, 4];
    let mut selector = Selector::new();
    let verdicts: Vec<Verdict> = [&a[..], &b[..], &a[..], &c[..], &a[..]]
        .iter()
        .enumerate()
        .map(|(i, sites)| selector.observe(completed("parse", i, sites)))
        .collect();

    assert_eq!(
        verdicts,
        vec![
            Verdict::Novel,
            Verdict::Novel,
            Verdict::Duplicate,
            Verdict::Novel,
            Verdict::Duplicate
        ]
    );
    let corpus = selector
        .corpora()
        .get(&FunctionIdentity::new("parse"))
        .unwrap();
    assert_eq!(corpus.alive_count(), 3);
    assert_eq!(corpus.entries().len(), 5);
    let kept: Vec<Option<usize>> = corpus.assemble(8).iter().map(|e| e.candidate).collect();
    assert_eq!(kept, vec![Some(0), Some(1), Some(3)]);
}

#[test]
fn test_duplicate_panic_stays_visible() {
    let mut selector = Selector::new();
    selector.observe(completed("parse", 0, &[0, 1]));
    selector.observe(panicked("parse", 1, &[0, 1]));

    let corpus = selector
        .corpora()
        .get(&FunctionIdentity::new("parse"))
        .unwrap();
    let kept = corpus.assemble(8);
    assert_eq!(kept.len(), 2);
    assert!(kept[1].failed);
    assert!(!kept[1].alive);
    assert_eq!(kept[1].ratio, -1.0);
    assert_eq!(
        kept[1].failure.as_ref().unwrap().message,
        "index out of bounds"
    );
    assert_eq!(selector.stats().failures, 1);
}

#[test]
fn test_failures_survive_the_cap() {
    let mut selector = Selector::new();
    for i in 0..5 {
        selector.observe(completed("parse", i, &[i as ProbeSite]));
    }
    selector.observe(panicked("parse", 5, &[0]));

    let assembled = selector.corpora().assemble(2);
    let kept: Vec<Option<usize>> = assembled["parse"].iter().map(|e| e.candidate).collect();
    assert_eq!(kept, vec![Some(0), Some(1), Some(5)]);
}

#[test]
fn test_task_identities_are_separate() {
    let mut selector = Selector::new();
    let direct = completed("spawn_worker", 0, &[0]);
    let mut first = completed("spawn_worker", 0, &[0]);
    first.identity = first.identity.as_task(0);
    let mut second = completed("spawn_worker", 0, &[0]);
    second.identity = second.identity.as_task(1);

    assert_eq!(selector.observe(direct), Verdict::Novel);
    assert_eq!(selector.observe(first), Verdict::Novel);
    assert_eq!(selector.observe(second), Verdict::Novel);
    assert_eq!(selector.corpora().len(), 3);
    let assembled = selector.corpora().assemble(8);
    assert!(assembled.contains_key("spawn_worker$task0"));
    assert!(assembled.contains_key("spawn_worker$task1"));
}

#[test]
fn test_collect_stops_on_disconnect() {
    let (tx, rx) = channel::bounded(16);
    let producers: Vec<_> = (0..4)
        .map(|i| {
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send(completed("parse", i, &[(i % 2) as ProbeSite])).unwrap();
            })
        })
        .collect();
    drop(tx);
    for p in producers {
        p.join().unwrap();
    }

    let mut selector = Selector::new();
    let stats = selector.collect(&rx, Duration::from_secs(30)).clone();
    assert_eq!(stats.stopped, Some(StopReason::Disconnected));
    assert_eq!(stats.received, 4);
    assert_eq!(stats.novel, 2);
    assert_eq!(stats.duplicates, 2);
}

#[test]
fn test_collect_stops_at_deadline() {
    let (tx, rx) = channel::bounded::<CoverageEvent>(4);
    tx.send(completed("parse", 0, &[1])).unwrap();

    let started = Instant::now();
    let mut selector = Selector::new();
    let stats = selector.collect(&rx, Duration::from_millis(100)).clone();

    assert_eq!(stats.stopped, Some(StopReason::Deadline));
    assert_eq!(stats.received, 1);
    assert!(started.elapsed() >= Duration::from_millis(100));
    // The sender is still alive; nothing else was read.
    drop(tx);
}

#[test]
fn test_handoff_maps_fragments_and_mocks() {
    let mut selector = Selector::new();
    selector.observe(completed("parse", 0, &[0]));
    selector.observe(completed("parse", 1, &[0]));
    selector.observe(completed("parse", 2, &[1]));

    let candidates: Vec<CandidateSource> = (0..3)
        .map(|i| CandidateSource {
            index: i,
            fragment: format!("let _ = parse({i}i64);"),
            mock_calls: [("fetch".to_string(), 1)].into_iter().collect(),
        })
        .collect();

    let handoff = selector.corpora().handoff(&candidates, 8);
    assert_eq!(
        handoff.functions["parse"],
        vec![
            "let _ = parse(0i64);".to_string(),
            "let _ = parse(2i64);".to_string()
        ]
    );
    assert_eq!(handoff.mock_calls["parse"]["fetch"], 2);
}

#[test]
fn test_coverage_totals() {
    let mut selector = Selector::new();
    selector.observe(completed("parse", 0, &[0, 1]));
    selector.observe(completed("parse", 1, &[0, 1]));
    selector.observe(completed("render", 2, &[3]));
    assert_eq!(selector.corpora().coverage_totals(), (12, 3));
}
