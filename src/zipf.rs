/// Zipfian term-distance sampling.
///
/// `ZipfianInt` draws integers in [min, max] with P(k) proportional to
/// k^(-theta), using the O(1) inverse-CDF approximation of Gray, Menasce
/// and Blakeley ("Quickly Generating Billion-Record Synthetic Databases",
/// SIGMOD 1994). The harmonic normalization zeta(theta, n) is computed once
/// at construction so every draw costs a single uniform variate and a
/// handful of multiplications.
use rand::Rng;

/// Approximate power function operating on the high 32 bits of an IEEE 754
/// double for the fractional part of the exponent, with exponentiation by
/// squaring for the integer part. Relative error reaches a few percent at
/// worst, which the sampler tolerates.
pub(crate) fn fast_precise_pow(a: f64, b: f64) -> f64 {
    let e = b as i64;

    // 1072632447 = (1023 << 20) - 60801: the IEEE 754 exponent bias shifted
    // into the high word, tuned down to balance the approximation error.
    let bits = a.to_bits();
    let high = (bits >> 32) as i64;
    let new_high = ((b - e as f64) * (high - 1_072_632_447) as f64 + 1_072_632_447.0) as i64;
    let frac = f64::from_bits((new_high as u64) << 32);

    let mut base = a;
    let mut exp = e.unsigned_abs();
    let mut r = 1.0f64;
    while exp != 0 {
        if exp & 1 != 0 {
            r *= base;
        }
        base *= base;
        exp >>= 1;
    }
    if e < 0 {
        r = 1.0 / r;
    }
    r * frac
}

/// A Zipf(min, max, theta) integer distribution with cached normalization.
#[derive(Clone, Copy, Debug)]
pub struct ZipfianInt {
    min: u64,
    max: u64,
    theta: f64,
    zeta: f64,
    // cached sampling constants
    alpha: f64,
    eta: f64,
    half_pow_theta: f64,
}

impl ZipfianInt {
    pub fn new(min: u64, max: u64, theta: f64) -> Self {
        debug_assert!(min <= max);
        let n = max - min + 1;
        let mut zeta = 0.0;
        for i in 1..=n {
            zeta += fast_precise_pow(1.0 / i as f64, theta);
        }
        let half_pow_theta = fast_precise_pow(0.5, theta);
        let zeta2 = 1.0 + half_pow_theta;
        let alpha = 1.0 / (1.0 - theta);
        let eta = (1.0 - fast_precise_pow(2.0 / n as f64, 1.0 - theta)) / (1.0 - zeta2 / zeta);
        ZipfianInt {
            min,
            max,
            theta,
            zeta,
            alpha,
            eta,
            half_pow_theta,
        }
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let n = self.max - self.min + 1;
        if n == 1 {
            return self.min;
        }
        let u: f64 = rng.random();
        let uz = u * self.zeta;
        if uz < 1.0 {
            return self.min;
        }
        if uz < 1.0 + self.half_pow_theta {
            return self.min + 1;
        }
        let k = self.min
            + (n as f64 * fast_precise_pow(self.eta * u - self.eta + 1.0, self.alpha)) as u64;
        k.min(self.max)
    }
}
