use std::f64::consts::PI;

/// A single feature column for statistical analysis.
pub struct FeatureSeries<'a> {
    values: &'a [f64],
}

impl<'a> FeatureSeries<'a> {
    pub fn new(values: &'a [f64]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance (divides by N, not N - 1).
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Normal probability density of `x` under N(mu, sig^2).
pub fn density(mu: f64, sig: f64, x: f64) -> f64 {
    let z = (x - mu) / sig;
    (-(z * z) / 2.0).exp() / (sig * (2.0 * PI).sqrt())
}

/// Natural log of [`density`], computed without going through `exp`.
pub fn log_density(mu: f64, sig: f64, x: f64) -> f64 {
    let z = (x - mu) / sig;
    -(z * z) / 2.0 - sig.ln() - 0.5 * (2.0 * PI).ln()
}

/// `ln(v + 1)`, mapping the `v == -1` singularity to 0.
pub fn log1p_transform(v: f64) -> f64 {
    let t = (v + 1.0).ln();
    if t == f64::NEG_INFINITY {
        0.0
    } else {
        t
    }
}
