//! Compiler options
//!
//! Everything the driver can configure lives in [`Options`]: the diagnostic
//! rendering knobs, feature options of the `-fNAME` / `-fno-NAME` /
//! `-fNAME=INT` family, the warning class switches, the optimization level
//! (recorded for the backend) and the input/output paths. A `rillc.toml`
//! project file can pre-set the diagnostics section; command-line flags are
//! applied on top and win.

use std::path::PathBuf;

use serde::Deserialize;

use crate::diag::DiagOptions;

/// `-O` levels. The front-end only records the choice; it is part of the
/// hand-off to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    #[default]
    O0,
    O1,
    O2,
    O3,
    /// Optimize for size.
    Os,
    /// Optimize aggressively for size.
    Oz,
}

impl OptimizationLevel {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "0" => OptimizationLevel::O0,
            "1" => OptimizationLevel::O1,
            "2" => OptimizationLevel::O2,
            "3" => OptimizationLevel::O3,
            "s" => OptimizationLevel::Os,
            "z" => OptimizationLevel::Oz,
            _ => return None,
        })
    }
}

/// Why a feature or warning option was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    Unknown(String),
    ExpectsInt(String),
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub diagnostics: DiagOptions,
    /// Stop after semantic analysis; never hand the AST to a backend.
    pub syntax_only: bool,
    /// Lex comments as tokens (used by tooling).
    pub keep_comments: bool,
    pub opt_level: OptimizationLevel,
    pub output: Option<PathBuf>,
    pub inputs: Vec<PathBuf>,
}

impl Options {
    pub fn new() -> Self {
        Options {
            diagnostics: DiagOptions::default(),
            ..Options::default()
        }
    }

    /// Applies one `-f` option: `NAME` switches a feature on, `no-NAME`
    /// switches it off, `NAME=INT` sets an integer feature.
    pub fn apply_feature(&mut self, option: &str) -> Result<(), OptionError> {
        if let Some((name, value)) = option.split_once('=') {
            let value: i64 = value
                .parse()
                .map_err(|_| OptionError::ExpectsInt(option.to_string()))?;
            return self.apply_int_feature(name, value, option);
        }

        let (name, value) = match option.strip_prefix("no-") {
            Some(stripped) => (stripped, false),
            None => (option, true),
        };

        match name {
            "color" | "diagnostics-color" => self.diagnostics.color = value,
            "diagnostics-show-column" => self.diagnostics.show_column = value,
            "diagnostics-show-line-numbers" => self.diagnostics.show_line_numbers = value,
            "syntax-only" => self.syntax_only = value,
            "keep-comments" => self.keep_comments = value,
            _ => return Err(OptionError::Unknown(option.to_string())),
        }
        Ok(())
    }

    fn apply_int_feature(
        &mut self,
        name: &str,
        value: i64,
        original: &str,
    ) -> Result<(), OptionError> {
        match name {
            "max-errors" => self.diagnostics.max_errors = value.max(0) as u32,
            "diagnostics-column-origin" => self.diagnostics.column_origin = value.clamp(0, 1) as u32,
            "diagnostics-margin-width" => {
                self.diagnostics.margin_width = value.clamp(1, 16) as usize
            }
            _ => return Err(OptionError::Unknown(original.to_string())),
        }
        Ok(())
    }

    /// Applies one `-W` option.
    pub fn apply_warning_option(&mut self, option: &str) -> Result<(), OptionError> {
        match option {
            "error" => self.diagnostics.warnings_as_errors = true,
            "fatal-errors" => self.diagnostics.fatal_errors = true,
            "no-warnings" => self.diagnostics.ignore_warnings = true,
            "no-notes" => self.diagnostics.ignore_notes = true,
            _ => return Err(OptionError::Unknown(option.to_string())),
        }
        Ok(())
    }
}

/// The `[diagnostics]` section of a `rillc.toml` project file. Every field
/// is optional; unset fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    diagnostics: ProjectDiagnostics,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ProjectDiagnostics {
    color: Option<bool>,
    show_column: Option<bool>,
    show_line_numbers: Option<bool>,
    column_origin: Option<u32>,
    margin_width: Option<usize>,
    max_errors: Option<u32>,
    warnings_as_errors: Option<bool>,
}

impl ProjectConfig {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("failed to parse project config: {e}"))
    }

    /// Folds the configured values into `options`. Command-line flags are
    /// applied after this, so they override the file.
    pub fn apply_to(&self, options: &mut Options) {
        let d = &self.diagnostics;
        if let Some(color) = d.color {
            options.diagnostics.color = color;
        }
        if let Some(show_column) = d.show_column {
            options.diagnostics.show_column = show_column;
        }
        if let Some(show_line_numbers) = d.show_line_numbers {
            options.diagnostics.show_line_numbers = show_line_numbers;
        }
        if let Some(origin) = d.column_origin {
            options.diagnostics.column_origin = origin.min(1);
        }
        if let Some(width) = d.margin_width {
            options.diagnostics.margin_width = width.clamp(1, 16);
        }
        if let Some(max_errors) = d.max_errors {
            options.diagnostics.max_errors = max_errors;
        }
        if let Some(promote) = d.warnings_as_errors {
            options.diagnostics.warnings_as_errors = promote;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_features() {
        let mut options = Options::new();
        assert!(!options.diagnostics.color);
        options.apply_feature("color").unwrap();
        assert!(options.diagnostics.color);
        options.apply_feature("no-color").unwrap();
        assert!(!options.diagnostics.color);
    }

    #[test]
    fn test_int_features() {
        let mut options = Options::new();
        options.apply_feature("max-errors=7").unwrap();
        assert_eq!(options.diagnostics.max_errors, 7);
        options.apply_feature("diagnostics-column-origin=0").unwrap();
        assert_eq!(options.diagnostics.column_origin, 0);
    }

    #[test]
    fn test_bad_features() {
        let mut options = Options::new();
        assert_eq!(
            options.apply_feature("does-not-exist"),
            Err(OptionError::Unknown("does-not-exist".to_string()))
        );
        assert_eq!(
            options.apply_feature("max-errors=lots"),
            Err(OptionError::ExpectsInt("max-errors=lots".to_string()))
        );
    }

    #[test]
    fn test_warning_options() {
        let mut options = Options::new();
        options.apply_warning_option("error").unwrap();
        assert!(options.diagnostics.warnings_as_errors);
        options.apply_warning_option("fatal-errors").unwrap();
        assert!(options.diagnostics.fatal_errors);
        assert!(options.apply_warning_option("bogus").is_err());
    }

    #[test]
    fn test_opt_levels() {
        assert_eq!(OptimizationLevel::parse("0"), Some(OptimizationLevel::O0));
        assert_eq!(OptimizationLevel::parse("z"), Some(OptimizationLevel::Oz));
        assert_eq!(OptimizationLevel::parse("9"), None);
    }

    #[test]
    fn test_project_config_merge() {
        let config = ProjectConfig::from_toml(
            r#"
[diagnostics]
color = true
max-errors = 3
column-origin = 0
"#,
        )
        .unwrap();

        let mut options = Options::new();
        config.apply_to(&mut options);
        assert!(options.diagnostics.color);
        assert_eq!(options.diagnostics.max_errors, 3);
        assert_eq!(options.diagnostics.column_origin, 0);

        // Flags applied after the file override it.
        options.apply_feature("no-color").unwrap();
        assert!(!options.diagnostics.color);
    }

    #[test]
    fn test_project_config_rejects_unknown_keys() {
        assert!(ProjectConfig::from_toml("[diagnostics]\nbogus = 1\n").is_err());
    }
}
