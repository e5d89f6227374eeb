use crate::style::GammaMethod;

/// Lookup table converting pixel coverage into alpha.
#[derive(Debug, Clone, PartialEq)]
pub struct Gamma {
    method: GammaMethod,
    value: f64,
    table: [u8; 256],
}

impl Gamma {
    /// Builds the table for the method:
    /// * `power`: `coverage ^ value`;
    /// * `linear`: linear ramp from `0` to `value`;
    /// * `none`: coverage is not changed;
    /// * `threshold`: `1` if coverage is at least `value`, `0` otherwise;
    /// * `multiply`: `coverage * value` clamped to `1`.
    pub fn new(method: GammaMethod, value: f64) -> Self {
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let x = i as f64 / 255.0;
            let y = match method {
                GammaMethod::Power => x.powf(value),
                GammaMethod::Linear => linear(x, 0.0, value),
                GammaMethod::None => x,
                GammaMethod::Threshold => {
                    if x < value {
                        0.0
                    } else {
                        1.0
                    }
                }
                GammaMethod::Multiply => (x * value).min(1.0),
            };
            *entry = (y.clamp(0.0, 1.0) * 255.0).round() as u8;
        }

        Self {
            method,
            value,
            table,
        }
    }

    /// Method of the table.
    pub fn method(&self) -> GammaMethod {
        self.method
    }

    /// Parameter of the method.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns true if the table does not change coverage.
    pub fn is_identity(&self) -> bool {
        self.table.iter().enumerate().all(|(i, v)| *v as usize == i)
    }

    /// Alpha for the coverage.
    pub fn apply(&self, coverage: u8) -> u8 {
        self.table[coverage as usize]
    }

    /// Alpha for the coverage in `[0, 1]`.
    pub fn apply_f32(&self, coverage: f32) -> u8 {
        self.apply((coverage.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

impl Default for Gamma {
    fn default() -> Self {
        Self::new(GammaMethod::Power, 1.0)
    }
}

fn linear(x: f64, start: f64, end: f64) -> f64 {
    if x < start {
        0.0
    } else if x > end {
        1.0
    } else if end - start <= 0.0 {
        1.0
    } else {
        (x - start) / (end - start)
    }
}
