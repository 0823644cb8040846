//! Learning transforms from training pairs and applying them back.

mod common;

use common::{call_stmt, fragment, site_with};
use patchgen::generator::{GeneratorKind, GeneratorLimits};
use patchgen::oracle::AcceptAll;
use patchgen::search::corpus::{read_corpus, write_corpus};
use patchgen::search::{SearchOptions, SearchSpace};
use patchgen::site::Site;
use patchgen::transform::{CodeTransform, TransformAbstractor};
use patchgen::tree::{Fragment, SyntaxNode};

fn learn(pairs: &[(Site, Fragment)]) -> Vec<CodeTransform> {
    let mut abstractor = TransformAbstractor::new(GeneratorLimits::default());
    for (site, after) in pairs {
        abstractor.add_mapping(site.clone(), after.clone());
    }
    assert!(abstractor.generalize(), "training pairs generalize");
    let transforms: Vec<CodeTransform> = abstractor.generators().collect();
    assert_eq!(transforms.len() as u64, abstractor.num_generators());
    transforms
}

fn relax_pairs() -> Vec<(Site, Fragment)> {
    [("i", "n"), ("lo", "hi")]
        .into_iter()
        .map(|(lhs, rhs)| {
            let operands = || (SyntaxNode::reference(lhs), SyntaxNode::reference(rhs));
            let (a, b) = operands();
            let before = SyntaxNode::binary("<", a, b);
            let (a, b) = operands();
            let after = SyntaxNode::binary("<=", a, b);
            (site_with(vec![before], &[]), fragment(vec![after]))
        })
        .collect()
}

fn rename_pairs() -> Vec<(Site, Fragment)> {
    vec![
        (
            site_with(vec![call_stmt("close", "reader")], &["stream"]),
            fragment(vec![call_stmt("close", "stream")]),
        ),
        (
            site_with(vec![call_stmt("close", "input")], &["channel"]),
            fragment(vec![call_stmt("close", "channel")]),
        ),
    ]
}

/// Every learned transform reproduces each training "after" at its site.
fn assert_round_trip(pairs: &[(Site, Fragment)], transforms: &[CodeTransform]) {
    let options = SearchOptions::default();
    for transform in transforms {
        let space = SearchSpace::new(vec![("t".to_string(), transform.clone())], options);
        for (site, after) in pairs {
            let results = space.apply_to(site, &AcceptAll);
            assert!(
                results.iter().any(|result| &result.candidate == after),
                "{} does not reproduce its training pair",
                transform.describe()
            );
        }
    }
}

#[test]
fn inferable_rule_round_trips() {
    let pairs = relax_pairs();
    let transforms = learn(&pairs);
    assert_eq!(transforms.len(), 1);
    assert!(transforms[0].generators().is_empty());
    assert_round_trip(&pairs, &transforms);
}

#[test]
fn generated_slot_round_trips_for_every_viable_generator() {
    let pairs = rename_pairs();
    let transforms = learn(&pairs);
    let kinds: Vec<GeneratorKind> = transforms
        .iter()
        .flat_map(|transform| transform.generators().values().map(|generator| generator.kind()))
        .collect();
    assert!(kinds.contains(&GeneratorKind::Reference), "{kinds:?}");
    assert!(kinds.contains(&GeneratorKind::Trait), "{kinds:?}");
    assert_round_trip(&pairs, &transforms);
}

#[test]
fn corpus_directory_round_trips() {
    let transforms = learn(&rename_pairs());
    let names: Vec<String> = (0..transforms.len()).map(|idx| format!("rename#{idx}")).collect();
    let dir = tempfile::tempdir().expect("tempdir");
    let written = write_corpus(
        dir.path(),
        names.iter().map(String::as_str).zip(transforms.iter()),
    )
    .expect("write corpus");
    assert_eq!(written, transforms.len());

    let loaded = read_corpus(dir.path()).expect("read corpus");
    assert_eq!(loaded.len(), transforms.len());
    for ((name, transform), (expected_name, expected)) in
        loaded.iter().zip(names.iter().zip(&transforms))
    {
        assert_eq!(name, expected_name);
        assert_eq!(transform, expected);
    }

    let space = SearchSpace::from_corpus_dir(dir.path(), SearchOptions::default())
        .expect("search space");
    let reloaded: Vec<CodeTransform> = space
        .entries()
        .iter()
        .map(|entry| (*entry.transform).clone())
        .collect();
    assert_round_trip(&rename_pairs(), &reloaded);
}

#[test]
fn learned_rule_does_not_apply_to_other_shapes() {
    let transforms = learn(&relax_pairs());
    let space = SearchSpace::new(
        vec![("relax".to_string(), transforms[0].clone())],
        SearchOptions::default(),
    );
    let statement = site_with(vec![call_stmt("close", "reader")], &[]);
    assert!(space.apply_to(&statement, &AcceptAll).is_empty());
    assert_eq!(space.failed_check_cnt(), 0);
}
