//! End-to-end scenarios through the search driver
use deltadebug::{
    MinimizeError, MinimizerConfig, Node, Outcome, Replacement, SearchDriver, Step,
    TerminationReason, TreeBuilder,
};

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn text(s: &[char]) -> String {
    s.iter().collect()
}

#[test]
fn test_three_blocks_converge_to_middle_block() {
    let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
    let oracle = |s: &[char]| {
        if text(s).contains("BBBBBBBBBB") {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    };

    let input = chars("AAAAAAAAAA BBBBBBBBBB CCCCCCCCCC");
    let report = driver.minimize_sequence(input, &oracle).unwrap();

    assert_eq!(text(&report.minimized), "BBBBBBBBBB");
    assert_eq!(report.termination, TerminationReason::Minimal);
    // n * log2(n) for n = 32
    assert!(report.stats.oracle_calls <= 32 * 5, "{}", report);
    for step in &report.trace.reductions {
        assert_eq!(oracle(&step.after), Outcome::Fail);
        assert!(step.after.len() < step.before.len());
    }
}

#[test]
fn test_single_element_needs_only_entry_check() {
    let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
    let oracle = |_: &[char]| Outcome::Fail;

    let report = driver.minimize_sequence(chars("X"), &oracle).unwrap();
    assert_eq!(report.minimized, chars("X"));
    assert_eq!(report.stats.oracle_calls, 1);
    assert_eq!(report.termination, TerminationReason::Minimal);
    assert!(report.trace.reductions.is_empty());
    assert!(report.trace.rejections.is_empty());
}

/// `(+ (* 1 2) 3)` where each operator may be replaced by one of its operands
fn expression() -> Node<String> {
    let mut b = TreeBuilder::new();
    let one = b.leaf("1".to_string());
    let two = b.leaf("2".to_string());
    let times = b
        .node("*".to_string(), vec![one.clone(), two.clone()])
        .with_alternatives(vec![Replacement::Subtree(one), Replacement::Subtree(two)]);
    let three = b.leaf("3".to_string());
    b.node("+".to_string(), vec![times.clone(), three.clone()])
        .with_alternatives(vec![
            Replacement::Subtree(times),
            Replacement::Subtree(three),
        ])
}

#[test]
fn test_expression_keeps_multiplication() {
    let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
    let oracle = |tree: &Node<String>| {
        if tree.contains(|n| n.payload() == "*") {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    };

    let report = driver.minimize_tree(expression(), &oracle).unwrap();
    assert_eq!(report.minimized.to_string(), "(* 1 2)");
    assert_eq!(report.termination, TerminationReason::Minimal);
    assert_eq!(report.stats.original_size, 5);
    assert_eq!(report.stats.minimized_size, 3);

    // both operands of `*` were rejected, the second pass from the cache
    assert_eq!(report.trace.passed().count(), 4);
    assert_eq!(report.trace.passed().filter(|r| !r.cached).count(), 2);
    assert!(report
        .trace
        .rejections
        .iter()
        .all(|r| matches!(r.step, Step::Replace { .. })));
}

#[test]
fn test_budget_of_one_call_returns_original() {
    let config = MinimizerConfig::from_json(r#"{"max_oracle_calls": 1}"#).unwrap();
    let driver = SearchDriver::new(config).unwrap();
    let oracle = |s: &[char]| {
        if s.contains(&'q') {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    };

    let input = chars("the quick brown fox");
    let report = driver.minimize_sequence(input.clone(), &oracle).unwrap();
    assert_eq!(report.termination, TerminationReason::BudgetExceeded);
    assert_eq!(report.minimized, input);
    assert_eq!(report.stats.oracle_calls, 1);
}

#[test]
fn test_round_limit_reports_budget_exceeded() {
    let config = MinimizerConfig {
        max_rounds: Some(1),
        ..MinimizerConfig::default()
    };
    let driver = SearchDriver::new(config).unwrap();
    let oracle = |s: &[u32]| {
        if s.contains(&17) {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    };

    let input: Vec<u32> = (0..40).collect();
    let report = driver.minimize_sequence(input, &oracle).unwrap();
    assert_eq!(report.termination, TerminationReason::BudgetExceeded);
    assert_eq!(report.stats.rounds, 1);
    assert!(report.minimized.contains(&17));
    assert!(report.minimized.len() < 40);
}

#[test]
fn test_unreproducible_input_is_an_error() {
    let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
    let oracle = |_: &[char]| Outcome::Pass;
    let err = driver.minimize_sequence(chars("abc"), &oracle).unwrap_err();
    assert!(matches!(
        err,
        MinimizeError::PreconditionViolation {
            outcome: Outcome::Pass,
            expected: Outcome::Fail
        }
    ));

    let err = driver.minimize_sequence(Vec::<char>::new(), &oracle).unwrap_err();
    assert!(matches!(err, MinimizeError::EmptyInput));
}

#[test]
fn test_panicking_oracle_probes_are_unresolved() {
    let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
    let oracle = |s: &[u8]| {
        if s.len() == 4 {
            panic!("oracle cannot handle four elements");
        }
        if s.contains(&5) {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    };

    let input: Vec<u8> = (0..8).collect();
    let report = driver.minimize_sequence(input, &oracle).unwrap();
    assert_eq!(report.minimized, vec![5]);
    assert!(report.stats.oracle_panics >= 2);
    assert!(report.trace.unresolved().all(|r| r.size == 4));
}

#[test]
fn test_isolate_difference() {
    let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
    let oracle = |s: &[u16]| {
        if s.contains(&4) && s.contains(&9) {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    };

    let failing: Vec<u16> = (0..16).collect();
    let report = driver.isolate(Vec::new(), failing, &oracle).unwrap();
    let isolation = &report.isolation;
    assert_eq!(isolation.difference.len(), 1);
    assert_eq!(oracle(&isolation.passing), Outcome::Pass);
    assert_eq!(oracle(&isolation.failing), Outcome::Fail);
    assert_eq!(isolation.failing.len(), isolation.passing.len() + 1);
    assert_eq!(report.stats.original_size, 16);
    assert_eq!(report.stats.minimized_size, 1);
}
