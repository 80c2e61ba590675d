use crate::F;

/// Log of probability zero.
pub const LOG_ZERO: F = f64::NEG_INFINITY;

/// Add two probabilities held as natural logarithms:
/// log(exp(a) + exp(b)) = max(a, b) + log1p(exp(-|a - b|))
///
/// Combining with LOG_ZERO returns the other operand unchanged, so
/// log_sum_exp(LOG_ZERO, LOG_ZERO) = LOG_ZERO.
pub fn log_sum_exp(a: F, b: F) -> F {
    if a == LOG_ZERO {
        return b;
    }
    if b == LOG_ZERO {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}
