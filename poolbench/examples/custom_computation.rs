//! Custom Computation Example
//!
//! Registers a computation next to the built-in ones. The example binary is
//! also the worker executable, so the pool can resolve `collatz` by name.
//!
//! Run with:
//!   cargo run --example custom_computation -- list
//!   cargo run --example custom_computation -- --algorithm collatz --benchmark poolMap
//!   cargo run --example custom_computation -- --algorithm collatz --benchmark poolApplyAsync --upper-limit 300000

use poolbench::{Computation, ComputationRegistry, ComputeError};

/// Steps for `n` to reach 1 under the Collatz map
fn collatz_steps(n: u64) -> Result<u64, ComputeError> {
    if n == 0 {
        return Err(ComputeError::failed("collatz is undefined for 0"));
    }

    let (mut n, mut steps) = (n, 0u64);
    while n > 1 {
        n = if n % 2 == 0 {
            n / 2
        } else {
            n.checked_mul(3)
                .and_then(|m| m.checked_add(1))
                .ok_or_else(|| ComputeError::failed("collatz trajectory overflows u64"))?
        };
        steps += 1;
    }
    Ok(steps)
}

const COLLATZ: Computation<u64> = Computation::new("collatz", collatz_steps);

fn main() -> anyhow::Result<()> {
    poolbench::run(ComputationRegistry::builtin().with(COLLATZ))
}
