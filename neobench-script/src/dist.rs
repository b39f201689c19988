//! Integer draws from the distributions the scripting language exposes.
//! The gaussian and exponential shapes follow pgbench.

use rand::Rng;

#[derive(Debug, thiserror::Error)]
pub enum DistError {
    #[error("random_gaussian 'parameter' argument must be at least {MIN_GAUSSIAN_PARAM}")]
    GaussianParameterTooSmall,
    #[error("parameter argument to random_exponential needs to be > 0")]
    ExponentialParameterNotPositive,
    #[error("random_exponential divide by zero error, please pick a different parameter value")]
    ExponentialDivideByZero,
}

pub const MIN_GAUSSIAN_PARAM: f64 = 2.0;

/// Uniform draw in `[min, max)`. Callers guarantee `max > min`.
pub fn uniform<R: Rng>(rng: &mut R, min: i64, max: i64) -> i64 {
    min + rng.gen_range(0..max - min)
}

/// Gaussian draw in `[min, max]` via the basic Box-Muller transform,
/// rejection-sampled until the deviate lands in `[-parameter, parameter)`.
/// With the minimum parameter of 2.0 the worst-case looping probability is
/// under 9%.
pub fn gaussian<R: Rng>(rng: &mut R, min: i64, max: i64, parameter: f64) -> Result<i64, DistError> {
    if parameter < MIN_GAUSSIAN_PARAM {
        return Err(DistError::GaussianParameterTooSmall);
    }

    let stdev = loop {
        // Box-Muller wants uniforms in (0, 1]; the generator gives [0, 1).
        let rand1 = 1.0 - rng.gen::<f64>();
        let rand2 = 1.0 - rng.gen::<f64>();

        let sqrt_val = (-2.0 * rand1.ln()).sqrt();
        let candidate = sqrt_val * (2.0 * std::f64::consts::PI * rand2).sin();

        if !(candidate < -parameter || candidate >= parameter) {
            break candidate;
        }
    };

    // stdev is in [-parameter, parameter); normalize to [0, 1).
    let rand_val = (stdev + parameter) / (parameter * 2.0);
    Ok(min + ((max - min + 1) as f64 * rand_val) as i64)
}

/// Exponential draw in `[min, max]`, denser toward `min` for larger
/// `parameter` values.
pub fn exponential<R: Rng>(
    rng: &mut R,
    min: i64,
    max: i64,
    parameter: f64,
) -> Result<i64, DistError> {
    if parameter <= 0.0 {
        return Err(DistError::ExponentialParameterNotPositive);
    }
    let cut = (-parameter).exp();
    if 1.0 - cut == 0.0 {
        return Err(DistError::ExponentialDivideByZero);
    }

    // uniform in (0, 1], so the inner expression stays in (cut, 1].
    let uniform = 1.0 - rng.gen::<f64>();
    let rand_val = -(cut + (1.0 - cut) * uniform).ln() / parameter;
    Ok(min + ((max - min + 1) as f64 * rand_val) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_stays_in_half_open_interval() {
        let mut rng = StdRng::seed_from_u64(1337);
        for _ in 0..10_000 {
            let v = uniform(&mut rng, 1, 5);
            assert!((1..5).contains(&v), "{v} out of [1, 5)");
        }
    }

    #[test]
    fn gaussian_stays_in_bounds_and_validates_parameter() {
        let mut rng = StdRng::seed_from_u64(1337);
        for _ in 0..10_000 {
            let v = gaussian(&mut rng, 1, 10, 2.5).expect("valid parameter");
            assert!((1..=10).contains(&v), "{v} out of [1, 10]");
        }
        assert!(gaussian(&mut rng, 1, 10, 1.5).is_err());
    }

    #[test]
    fn exponential_stays_in_bounds_and_validates_parameter() {
        let mut rng = StdRng::seed_from_u64(1337);
        for _ in 0..10_000 {
            let v = exponential(&mut rng, 1, 10, 2.5).expect("valid parameter");
            assert!((1..=10).contains(&v), "{v} out of [1, 10]");
        }
        assert!(exponential(&mut rng, 1, 10, 0.0).is_err());
    }

    #[test]
    fn draws_are_deterministic_for_a_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(uniform(&mut a, 0, 1_000_000), uniform(&mut b, 0, 1_000_000));
        }
    }
}
