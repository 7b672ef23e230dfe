//! Sample CPU-bound payloads.

use crate::computation::{ComputeError, Computation};

/// Trial-division primality check
pub const PRIME_CHECKER: Computation<bool> = Computation::new("primeChecker", check_if_prime);

/// Iterative Fibonacci over `u64`
pub const FIBONACCI: Computation<u64> = Computation::new("fibonacci", fibonacci);

/// Whether `n` is prime. 0 and 1 are not.
pub fn check_if_prime(n: u64) -> Result<bool, ComputeError> {
    if n < 2 {
        return Ok(false);
    }
    Ok(!(2..=n.isqrt()).any(|divisor| n % divisor == 0))
}

/// The `n`-th Fibonacci number with `fib(0) = 0` and `fib(1) = 1`.
///
/// Fails for `n >= 94`, the first index that does not fit in a `u64`.
pub fn fibonacci(n: u64) -> Result<u64, ComputeError> {
    if n == 0 {
        return Ok(0);
    }

    let (mut a, mut b) = (0u64, 1u64);
    for _ in 1..n {
        let next = a
            .checked_add(b)
            .ok_or_else(|| ComputeError::failed(format!("fibonacci({n}) overflows u64")))?;
        a = b;
        b = next;
    }
    Ok(b)
}
