use indicatif::{ProgressBar, ProgressStyle};

/// Long synchronous loops (corpus build, transcript import) report progress
/// once per chunk of this many entries
pub const PROGRESS_CHUNK: usize = 5000;

pub fn get_progressbar(total: u64) -> ProgressBar{
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template("[{elapsed_precise} ETA {eta}] {bar:40.cyan/blue} {pos}/{len} {per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    bar.set_style(style);
    bar
}

/// arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// median (average of the two middle values for even lengths), `None` for an empty slice
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Parses a numeric cell of a TSV file. Empty cells, `NA` and anything else
/// that is not a finite-or-infinite float are treated as missing.
pub fn parse_optional_float(s: &str) -> Option<f64> {
    match s.trim().parse::<f64>() {
        Ok(x) if !x.is_nan() => Some(x),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::{mean, median, parse_optional_float};

    #[test]
    fn test_mean(){
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0]), Some(2.0));
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
    }

    #[test]
    fn test_median(){
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_parse_optional_float(){
        assert_eq!(parse_optional_float("1.5"), Some(1.5));
        assert_eq!(parse_optional_float(" -0.25 "), Some(-0.25));
        assert_eq!(parse_optional_float("NA"), None);
        assert_eq!(parse_optional_float(""), None);
        assert_eq!(parse_optional_float("NaN"), None);
        assert_eq!(parse_optional_float("1e-300"), Some(1e-300));
    }
}
