//! Lowering options and their `key = value` parse helpers.

use super::LoweringError;

/// Knobs of one lowering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct LoweringOptions {
    /// Consult the default registry in else-less alt and interleave constructs.
    pub consult_defaults: bool,
    /// Maximum nesting of alt-like constructs and loops inside one body.
    pub max_nesting_depth: usize,
    /// Emit a warning for branches declared after an unguarded else.
    pub warn_unreachable_branches: bool,
}

impl LoweringOptions {
    /// Options without default-registry consultation, e.g. for bodies that
    /// run with no component defaults activated.
    pub fn without_defaults() -> Self {
        Self {
            consult_defaults: false,
            ..Self::default()
        }
    }

    /// Apply one `key = value` setting.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), LoweringError> {
        match key.trim() {
            "consult_defaults" | "defaults" => self.consult_defaults = parse_flag(key, value)?,
            "max_nesting_depth" | "max_depth" => self.max_nesting_depth = parse_depth(value)?,
            "warn_unreachable_branches" | "warn_unreachable" => {
                self.warn_unreachable_branches = parse_flag(key, value)?
            }
            other => {
                return Err(LoweringError::Unsupported(format!(
                    "Unknown lowering option '{other}'; expected 'consult_defaults', \
                     'max_nesting_depth', or 'warn_unreachable_branches'"
                )))
            }
        }
        Ok(())
    }

    /// Build options from `key = value` lines. Blank lines and `#` comments
    /// are skipped.
    pub fn from_settings(text: &str) -> Result<Self, LoweringError> {
        let mut options = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(LoweringError::Unsupported(format!(
                    "Malformed lowering option '{line}'; expected 'key = value'"
                )));
            };
            options.apply(key, value)?;
        }
        Ok(options)
    }
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            consult_defaults: true,
            max_nesting_depth: 64,
            warn_unreachable_branches: true,
        }
    }
}

pub(super) fn parse_flag(key: &str, raw: &str) -> Result<bool, LoweringError> {
    match raw.trim() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(LoweringError::Unsupported(format!(
            "Unsupported value '{other}' for '{}'; expected 'true' or 'false'",
            key.trim()
        ))),
    }
}

pub(super) fn parse_depth(raw: &str) -> Result<usize, LoweringError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(LoweringError::Unsupported(
            "max_nesting_depth must be at least 1".into(),
        )),
        Ok(n) => Ok(n),
        Err(_) => Err(LoweringError::Unsupported(format!(
            "Unsupported nesting depth '{}'; expected a positive integer",
            raw.trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_override_defaults() {
        let opts = LoweringOptions::from_settings(
            "# lowering\nconsult_defaults = off\n\nmax_depth = 8\n",
        )
        .unwrap();
        assert!(!opts.consult_defaults);
        assert_eq!(opts.max_nesting_depth, 8);
        assert!(opts.warn_unreachable_branches);
    }

    #[test]
    fn bad_values_are_unsupported() {
        let mut opts = LoweringOptions::default();
        assert!(matches!(
            opts.apply("consult_defaults", "maybe"),
            Err(LoweringError::Unsupported(_))
        ));
        assert!(matches!(
            opts.apply("max_nesting_depth", "0"),
            Err(LoweringError::Unsupported(_))
        ));
        assert!(matches!(
            opts.apply("colour", "blue"),
            Err(LoweringError::Unsupported(_))
        ));
        assert!(LoweringOptions::from_settings("consult_defaults").is_err());
    }
}
