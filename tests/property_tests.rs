//! Seeded randomized checks of the minimizer invariants
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use deltadebug::{MinimizerConfig, Outcome, SearchDriver, TerminationReason};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SEEDS: u64 = 24;

fn is_subsequence(needle: &[u8], haystack: &[u8]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|x| rest.any(|y| y == x))
}

/// A random input and an ordered sample of its elements that must survive
fn subsequence_case(rng: &mut ChaCha8Rng) -> (Vec<u8>, Vec<u8>) {
    let len = rng.gen_range(8..64);
    let input: Vec<u8> = (0..len).map(|_| rng.gen_range(0..16)).collect();
    let keep = rng.gen_range(1..4);
    let mut positions = sample(rng, len, keep).into_vec();
    positions.sort_unstable();
    let needle = positions.iter().map(|&i| input[i]).collect();
    (input, needle)
}

fn driver(parallelism: usize) -> SearchDriver {
    SearchDriver::new(MinimizerConfig {
        parallelism,
        verify_minimality: true,
        ..MinimizerConfig::default()
    })
    .unwrap()
}

#[test]
fn test_subsequence_oracle_reduces_to_needle() {
    for seed in 0..SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (input, needle) = subsequence_case(&mut rng);
        let oracle = |s: &[u8]| {
            if is_subsequence(&needle, s) {
                Outcome::Fail
            } else if s.len() % 5 == 0 {
                Outcome::Unresolved
            } else {
                Outcome::Pass
            }
        };

        let report = driver(1).minimize_sequence(input.clone(), &oracle).unwrap();
        assert_eq!(report.minimized, needle, "seed {}", seed);
        assert_eq!(report.termination, TerminationReason::Minimal);
        assert_eq!(report.stats.one_minimal, Some(true), "seed {}", seed);

        for step in &report.trace.reductions {
            assert_eq!(oracle(&step.after), Outcome::Fail, "seed {}", seed);
            assert!(step.after.len() < step.before.len(), "seed {}", seed);
        }
    }
}

#[test]
fn test_non_monotone_oracle_result_is_one_minimal() {
    for seed in 0..SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(1000 + seed);
        let len = rng.gen_range(4..40);
        let mut input: Vec<u8> = (0..len).map(|_| rng.gen_range(0..50)).collect();
        let sum: u32 = input.iter().map(|&x| x as u32).sum();
        // force the original to fail
        let fix = (3 + 7 - sum % 7) % 7;
        input.push(fix as u8);

        let oracle = |s: &[u8]| {
            let sum: u32 = s.iter().map(|&x| x as u32).sum();
            if sum % 7 == 3 {
                Outcome::Fail
            } else {
                Outcome::Pass
            }
        };
        assert_eq!(oracle(&input), Outcome::Fail);

        let report = driver(1).minimize_sequence(input, &oracle).unwrap();
        assert_eq!(oracle(&report.minimized), Outcome::Fail, "seed {}", seed);
        assert_eq!(report.stats.one_minimal, Some(true), "seed {}", seed);
        for i in 0..report.minimized.len() {
            if report.minimized.len() == 1 {
                break;
            }
            let mut smaller = report.minimized.clone();
            smaller.remove(i);
            assert_ne!(oracle(&smaller), Outcome::Fail, "seed {} index {}", seed, i);
        }
    }
}

#[test]
fn test_parallelism_does_not_change_result() {
    for seed in 0..SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(2000 + seed);
        let (input, needle) = subsequence_case(&mut rng);
        let oracle = |s: &[u8]| {
            // accepts several incomparable minima, so order matters
            if is_subsequence(&needle, s) || s.iter().filter(|&&x| x == 3).count() >= 2 {
                Outcome::Fail
            } else {
                Outcome::Pass
            }
        };

        let sequential = driver(1).minimize_sequence(input.clone(), &oracle).unwrap();
        let parallel = driver(4).minimize_sequence(input, &oracle).unwrap();
        assert_eq!(sequential.minimized, parallel.minimized, "seed {}", seed);
        assert_eq!(sequential.trace.reductions, parallel.trace.reductions, "seed {}", seed);
        assert_eq!(sequential.termination, parallel.termination);
    }
}

#[test]
fn test_oracle_runs_once_per_distinct_candidate() {
    for parallelism in [1, 4] {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let (input, needle) = subsequence_case(&mut rng);
        let seen: Mutex<HashMap<Vec<u8>, usize>> = Mutex::new(HashMap::new());
        let oracle = |s: &[u8]| {
            *seen.lock().unwrap().entry(s.to_vec()).or_insert(0) += 1;
            if is_subsequence(&needle, s) {
                Outcome::Fail
            } else {
                Outcome::Pass
            }
        };

        let report = driver(parallelism).minimize_sequence(input, &oracle).unwrap();
        let seen = seen.lock().unwrap();
        assert!(seen.values().all(|&count| count == 1), "{:?}", seen);
        assert_eq!(seen.len(), report.stats.oracle_calls);
    }
}

#[test]
fn test_cancellation_returns_failing_input() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let input: Vec<u8> = (0..200).map(|_| rng.gen_range(0..100)).collect();
    let needle = vec![input[20], input[150]];

    let driver = driver(1);
    let token = driver.cancel_token();
    let calls = AtomicUsize::new(0);
    let oracle = |s: &[u8]| {
        if calls.fetch_add(1, Ordering::SeqCst) == 5 {
            token.cancel();
        }
        if is_subsequence(&needle, s) {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    };

    let report = driver.minimize_sequence(input.clone(), &oracle).unwrap();
    assert_eq!(report.termination, TerminationReason::Cancelled);
    assert_eq!(oracle(&report.minimized), Outcome::Fail);
    assert!(report.minimized.len() <= input.len());
    assert_eq!(report.stats.one_minimal, None);
}
