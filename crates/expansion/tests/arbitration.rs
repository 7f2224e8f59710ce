use context_chain::{Document, Unit, UnitSpan};
use context_expansion::{
    expand_cluster, refine_cluster, run_round, ArbitrationConfig, Candidate, CandidateCluster,
    ContextExpansion, Evaluator, ExpansionConfig, Growth, GrowthAction, RoundSnapshot,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Every unit has two words; a window scores the sum of its unit weights.
fn weighted(weights: &[f32]) -> (Document, Evaluator<impl Fn(&str, &[Unit]) -> f32>) {
    let document = Document::from_texts(7, (0..weights.len()).map(|i| format!("s{i} w ")))
        .expect("document");
    let weights = weights.to_vec();
    let evaluator = Evaluator::new("query", move |_: &str, units: &[Unit]| -> f32 {
        units.iter().map(|u| weights[u.index]).sum()
    });
    (document, evaluator)
}

fn evaluated(
    anchors: &[usize],
    document: &Document,
    evaluator: &Evaluator<impl Fn(&str, &[Unit]) -> f32>,
) -> CandidateCluster {
    let mut cluster = CandidateCluster::new(document.id, 1, anchors.to_vec(), 0.9);
    cluster.evaluate(document, evaluator).expect("evaluate");
    cluster
}

fn assert_disjoint(snapshot: &RoundSnapshot) {
    let spans = snapshot.spans();
    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            assert!(!a.overlaps(b), "{a} overlaps {b}");
        }
    }
}

#[test]
fn strongest_candidate_wins_contested_unit() {
    init_logging();
    let (doc, eval) = weighted(&[0.0, 0.0, 9.0, 1.0, 1.0, 3.0, 0.0, 0.0, 7.0, 0.0]);
    let mut cluster = evaluated(&[2, 5, 8], &doc, &eval);
    assert_eq!(cluster.anchors(), vec![2, 8, 5]);

    let snapshots: Vec<_> =
        ContextExpansion::new(&mut cluster, &doc, &eval, ArbitrationConfig::default())
            .collect::<context_expansion::Result<_>>()
            .expect("expansion");

    let last = snapshots.last().expect("at least one round");
    assert!(last.converged);
    assert_disjoint(last);

    let winner = &last.entries[0];
    assert_eq!(winner.anchor, 2);
    assert!(winner.span.contains(4));
    assert_eq!(winner.span, UnitSpan::new(2, 5));
    assert_eq!(winner.score, 14.0);
    assert!(winner
        .actions
        .iter()
        .all(|action| matches!(action, GrowthAction::Right(1))));

    assert_eq!(last.entries.len(), 2);
    assert_eq!(last.entries[1].anchor, 8);
    assert_eq!(last.entries[1].span, UnitSpan::single(8));
    assert!(!last.entries[1].expandable);

    // @5 is pushed back to its anchor, frozen there, and finally loses its anchor unit
    assert!(snapshots[1]
        .entries
        .iter()
        .any(|e| e.anchor == 5 && e.span == UnitSpan::single(5)));
    assert!(last.entries.iter().all(|e| e.anchor != 5));
}

#[test]
fn right_growth_at_last_unit_keeps_default_density() {
    let (doc, eval) = weighted(&[0.0, 0.0, 0.0, 2.0]);
    let mut candidate = Candidate::new(3, 2.0);

    let index = candidate
        .expand(Growth::Right, 3, None, 0, &doc, &eval)
        .expect("expand")
        .expect("state");
    let state = &candidate.history()[index];
    assert_eq!(state.span(), UnitSpan::single(3));
    assert_eq!(state.improvement_density(), 0.0);
}

#[test]
fn merge_joins_touching_windows() {
    init_logging();
    let (doc, eval) = weighted(&[0.0, 5.0, 2.0, 0.0, 4.0, 0.0]);
    let mut cluster = evaluated(&[1, 3], &doc, &eval);

    // @1 stops at [1, 2] and @3 at [3, 4]; unit 3 adds nothing to @1
    let result = expand_cluster(&mut cluster, &doc, &eval, &ArbitrationConfig::default())
        .expect("expansion");
    assert_eq!(result.spans(), vec![UnitSpan::new(1, 2), UnitSpan::new(3, 4)]);

    cluster.merge(2.0, &doc, &eval).expect("merge");
    assert_eq!(cluster.len(), 1);
    let merged = &cluster.candidates()[0];
    assert_eq!(merged.span(), UnitSpan::new(1, 4));
    assert_eq!(merged.score(), 11.0);
    assert_eq!(merged.context().last_action(), Some(GrowthAction::Merge));
}

#[test]
fn refine_applies_configured_passes() {
    init_logging();
    let (doc, eval) = weighted(&[0.0, 5.0, 2.0, 0.0, 4.0, 0.0, -9.0]);
    let mut cluster = CandidateCluster::new(doc.id, 2, vec![1, 3, 6], 0.7);

    let config = ExpansionConfig::default();
    let snapshot = refine_cluster(&mut cluster, &doc, &eval, &config).expect("refine");

    assert!(snapshot.converged);
    assert_eq!(snapshot.spans(), vec![UnitSpan::new(1, 4)]);
    assert_eq!(snapshot.entries[0].text, "s1 w  s2 w  s3 w  s4 w ");
    assert_eq!(
        cluster.text(&doc, &config.selection).expect("text"),
        "s1 w  s2 w  s3 w  s4 w "
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn converged_windows_never_overlap(
        weights in prop::collection::vec(-3.0f32..10.0, 2..14),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..6),
    ) {
        let (doc, eval) = weighted(&weights);
        let mut anchors: Vec<usize> = picks.iter().map(|p| p.index(weights.len())).collect();
        anchors.sort_unstable();
        anchors.dedup();
        let mut cluster = evaluated(&anchors, &doc, &eval);

        let snapshots: Vec<_> =
            ContextExpansion::new(&mut cluster, &doc, &eval, ArbitrationConfig::default())
                .collect::<context_expansion::Result<_>>()
                .unwrap();

        prop_assert!(!snapshots.is_empty());
        let last = snapshots.last().unwrap();
        prop_assert!(last.converged);

        let spans = last.spans();
        for (i, a) in spans.iter().enumerate() {
            for b in &spans[i + 1..] {
                prop_assert!(!a.overlaps(b));
            }
        }
        for pair in last.entries.windows(2) {
            let order = pair[0].score.total_cmp(&pair[1].score);
            prop_assert!(order.is_gt() || (order.is_eq() && pair[0].anchor < pair[1].anchor));
        }
        for candidate in cluster.candidates() {
            prop_assert_eq!(candidate.history().len(), 1);
        }
    }

    #[test]
    fn rounds_settle_before_the_round_limit(
        weights in prop::collection::vec(-3.0f32..10.0, 2..14),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..6),
    ) {
        let (doc, eval) = weighted(&weights);
        let mut anchors: Vec<usize> = picks.iter().map(|p| p.index(weights.len())).collect();
        anchors.sort_unstable();
        anchors.dedup();
        let mut cluster = evaluated(&anchors, &doc, &eval);
        let limit = cluster.len() * doc.len();
        let config = ArbitrationConfig::default();

        let mut previous = None;
        let mut rounds = 0;
        loop {
            let outcome =
                run_round(&mut cluster, &doc, &eval, rounds, previous.as_ref(), &config).unwrap();
            rounds += 1;
            if !outcome.expanded {
                break;
            }
            prop_assert!(rounds < limit, "still growing after {} rounds", rounds);
            previous = Some(outcome.ownership);
        }

        prop_assert!(cluster.candidates().iter().all(|c| !c.is_expandable()));
        let spans: Vec<_> = cluster.candidates().iter().map(Candidate::span).collect();
        for (i, a) in spans.iter().enumerate() {
            for b in &spans[i + 1..] {
                prop_assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn rerank_is_idempotent(scores in prop::collection::vec(-5.0f32..5.0, 0..20)) {
        let candidates = scores
            .iter()
            .enumerate()
            .map(|(anchor, &score)| Candidate::new(anchor % 7, score))
            .collect();
        let mut cluster = CandidateCluster::from_candidates(0, 0, candidates);

        cluster.rerank();
        let once = cluster.clone();
        cluster.rerank();
        prop_assert_eq!(&cluster, &once);

        cluster.remove_duplicates();
        let spans: Vec<_> = cluster.candidates().iter().map(Candidate::span).collect();
        let mut unique = spans.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(spans.len(), unique.len());
    }
}
