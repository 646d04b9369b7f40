//! Oracle functions for scenario verification.
//!
//! Oracle functions run once the connection has closed cleanly, to decide
//! between `passed` and `failed-assertion`. They receive the run's
//! [`Evidence`] and assert invariants over it.

use std::fmt::Write as _;

use mqcheck_core::step::Step;

use crate::scenario::Evidence;

/// Oracle function type.
///
/// Receives the run's evidence and returns:
/// - `Ok(())` if all invariants hold
/// - `Err(message)` if verification fails
pub type OracleFn = Box<dyn FnOnce(&Evidence<'_>) -> Result<(), String>>;

/// Create an oracle that requires at least `count` outcome records.
pub fn min_records(count: usize) -> OracleFn {
    Box::new(move |evidence| {
        let found = evidence.records().len();
        if found >= count {
            Ok(())
        } else {
            Err(format!("expected at least {} records, found {}", count, found))
        }
    })
}

/// Create an oracle that requires the first two retrieved bodies to be equal
/// to each other and to the published body.
pub fn redelivery_matches_published() -> OracleFn {
    Box::new(|evidence| {
        let bodies = evidence.bodies();
        let [first, second, ..] = bodies.as_slice() else {
            return Err(format!("expected two retrieved bodies, found {}", bodies.len()));
        };
        let Some(published) = evidence.published().first() else {
            return Err("nothing was published".to_string());
        };

        if first != second {
            return Err(format!(
                "first retrieval {:?} differs from second retrieval {:?}",
                String::from_utf8_lossy(first),
                String::from_utf8_lossy(second)
            ));
        }
        if *first != published {
            return Err(format!(
                "retrieved {:?} but published {:?}",
                String::from_utf8_lossy(first),
                String::from_utf8_lossy(published)
            ));
        }
        Ok(())
    })
}

/// Create an oracle that requires the retrieved bodies to be exactly
/// `expected`, in order.
pub fn bodies_equal(expected: Vec<&'static str>) -> OracleFn {
    Box::new(move |evidence| {
        let bodies = evidence.bodies();
        let matches = bodies.len() == expected.len()
            && bodies.iter().zip(&expected).all(|(body, want)| *body == want.as_bytes());

        if matches {
            return Ok(());
        }

        let mut found = String::new();
        for body in bodies {
            let _ = write!(found, "{:?} ", String::from_utf8_lossy(body));
        }
        Err(format!("expected bodies {:?}, found [{}]", expected, found.trim_end()))
    })
}

/// Create an oracle that requires flag `name` to have been recorded `true`.
pub fn flag_set(name: &'static str) -> OracleFn {
    Box::new(move |evidence| match evidence.flag(name) {
        Some(true) => Ok(()),
        Some(false) => Err(format!("flag {} was recorded false", name)),
        None => Err(format!("flag {} was never recorded", name)),
    })
}

/// Create an oracle that requires `step` to have been reached.
pub fn reached(step: Step) -> OracleFn {
    Box::new(move |evidence| {
        if evidence.reached(step) {
            Ok(())
        } else {
            Err(format!("step {} was never reached", step))
        }
    })
}

/// Create an oracle that fails with `reason` if `step` was reached.
///
/// For negative scenarios, where completing `step` means the broker accepted
/// something it should have refused.
pub fn not_reached(step: Step, reason: impl Into<String>) -> OracleFn {
    let reason = reason.into();
    Box::new(move |evidence| if evidence.reached(step) { Err(reason) } else { Ok(()) })
}

/// Create an oracle that requires every planned step to have been reached.
pub fn plan_completed() -> OracleFn {
    Box::new(|evidence| {
        if evidence.plan_completed() {
            Ok(())
        } else {
            Err(format!("plan stopped after {:?}", evidence.visited().last()))
        }
    })
}

/// Combine multiple oracles into one.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |evidence| {
        for oracle in oracles {
            oracle(evidence)?;
        }
        Ok(())
    })
}
