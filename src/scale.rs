//! Linear mapping between a data domain and a pixel range, as used by the MA plot axes.
//!
//! The range may be inverted (e.g. `[height, 0]` for a y axis growing upwards).
use crate::error::{DredgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Result<Self> {
        let finite = [domain.0, domain.1, range.0, range.1].iter().all(|x| x.is_finite());
        if !finite {
            return Err(DredgeError::invalid_scale(format!("non-finite scale {domain:?} -> {range:?}")));
        }
        if domain.0 == domain.1 {
            return Err(DredgeError::invalid_scale(format!("zero-length domain {domain:?}")));
        }
        if range.0 == range.1 {
            return Err(DredgeError::invalid_scale(format!("zero-length range {range:?}")));
        }
        Ok(LinearScale { domain, range })
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    /// domain endpoints in ascending order
    pub fn domain_extent(&self) -> (f64, f64) {
        let (a, b) = self.domain;
        (a.min(b), a.max(b))
    }

    /// data -> pixel
    pub fn apply(&self, x: f64) -> f64 {
        let t = (x - self.domain.0) / (self.domain.1 - self.domain.0);
        self.range.0 + t * (self.range.1 - self.range.0)
    }

    /// pixel -> data
    pub fn invert(&self, px: f64) -> f64 {
        let t = (px - self.range.0) / (self.range.1 - self.range.0);
        self.domain.0 + t * (self.domain.1 - self.domain.0)
    }
}

#[cfg(test)]
mod tests {
    use super::LinearScale;

    #[test]
    fn test_apply_invert() {
        let s = LinearScale::new((-2.0, 8.0), (0.0, 500.0)).unwrap();
        assert_eq!(s.apply(-2.0), 0.0);
        assert_eq!(s.apply(8.0), 500.0);
        assert_eq!(s.apply(3.0), 250.0);
        assert_eq!(s.invert(250.0), 3.0);
        assert!((s.invert(s.apply(1.5)) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_range() {
        let s = LinearScale::new((-4.0, 4.0), (400.0, 0.0)).unwrap();
        assert_eq!(s.apply(4.0), 0.0);
        assert_eq!(s.apply(-4.0), 400.0);
        assert_eq!(s.invert(100.0), 2.0);
        assert_eq!(s.domain_extent(), (-4.0, 4.0));
    }

    #[test]
    fn test_degenerate_scales() {
        assert!(LinearScale::new((1.0, 1.0), (0.0, 10.0)).is_err());
        assert!(LinearScale::new((0.0, 1.0), (5.0, 5.0)).is_err());
        assert!(LinearScale::new((0.0, f64::NAN), (0.0, 1.0)).is_err());
    }
}
