use ge_tensor::DivisionPolicy;

use crate::error::{GraphError, Result};

pub const KEY_PARALLEL: &str = "EVAL_PARALLEL";
pub const KEY_THREADS: &str = "EVAL_THREADS";
pub const KEY_FLOAT_DIVISION: &str = "EVAL_FLOAT_DIVISION";

/// Evaluator settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvaluatorConfig {
    /// Evaluate independent nodes of a dependency level concurrently.
    pub parallel: bool,
    /// Size of a dedicated thread pool; `None` uses rayon's global pool.
    pub num_threads: Option<usize>,
    /// Behaviour of floating-point division by zero.
    pub division: DivisionPolicy,
}

impl EvaluatorConfig {
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_division(mut self, division: DivisionPolicy) -> Self {
        self.division = division;
        self
    }

    /// Parse string options such as `("EVAL_PARALLEL", "YES")`.
    ///
    /// Keys not listed here, or values outside their domain, are rejected.
    pub fn from_options(options: &[(&str, &str)]) -> Result<Self> {
        let mut config = Self::default();
        for &(key, value) in options {
            match key {
                KEY_PARALLEL => config.parallel = parse_yes_no(key, value)?,
                KEY_THREADS => {
                    let n: usize = value.trim().parse().map_err(|_| {
                        invalid(key, format!("expected a positive integer, got {:?}", value))
                    })?;
                    if n == 0 {
                        return Err(invalid(key, "thread count must be positive".to_string()));
                    }
                    config.num_threads = Some(n);
                }
                KEY_FLOAT_DIVISION => {
                    config.division = match value.to_ascii_uppercase().as_str() {
                        "IEEE" => DivisionPolicy::Ieee,
                        "STRICT" => DivisionPolicy::Strict,
                        _ => {
                            let reason = format!("expected IEEE or STRICT, got {:?}", value);
                            return Err(invalid(key, reason));
                        }
                    }
                }
                _ => return Err(invalid(key, "unsupported key".to_string())),
            }
        }
        Ok(config)
    }
}

fn parse_yes_no(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_uppercase().as_str() {
        "YES" => Ok(true),
        "NO" => Ok(false),
        _ => Err(invalid(key, format!("expected YES or NO, got {:?}", value))),
    }
}

fn invalid(key: &str, reason: String) -> GraphError {
    GraphError::InvalidConfig {
        key: key.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_config() {
        let config = EvaluatorConfig::default();
        assert!(!config.parallel);
        assert_eq!(config.num_threads, None);
        assert_eq!(config.division, DivisionPolicy::Ieee);
    }

    #[test]
    fn test_from_options() {
        let config = EvaluatorConfig::from_options(&[
            ("EVAL_PARALLEL", "YES"),
            ("EVAL_THREADS", "4"),
            ("EVAL_FLOAT_DIVISION", "strict"),
        ])
        .unwrap();
        assert_eq!(
            config,
            EvaluatorConfig::default()
                .with_parallel(true)
                .with_num_threads(4)
                .with_division(DivisionPolicy::Strict)
        );
    }

    #[test]
    fn test_invalid_options() {
        for options in [
            [("EVAL_PARALLEL", "maybe")],
            [("EVAL_THREADS", "0")],
            [("EVAL_THREADS", "-2")],
            [("EVAL_FLOAT_DIVISION", "fast")],
            [("PERF_COUNT", "YES")],
        ] {
            let err = EvaluatorConfig::from_options(&options).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig, "{:?}", options);
        }
    }
}
