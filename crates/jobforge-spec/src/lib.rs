//! Job-group validation for jobforge.
//!
//! Checks a whole job-group document for internal consistency before it is
//! compiled:
//!
//! 1. **References**: requirement, excluded-requirement and resource-profile
//!    names resolve against the effective preset and resource maps
//! 2. **Enumerations**: trigger types and modifiers are known values
//! 3. **Schedules**: periodic jobs set exactly one of cron / interval, and it
//!    parses
//! 4. **Shapes**: repository references take the form `org/repo[@branch]`
//!
//! Every violation is collected; nothing fails fast.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jobforge_spec::Validator;
//!
//! let validator = Validator::new(&settings);
//! validator.validate("istio.yaml", &group).ensure_valid()?;
//! ```

pub mod schedule;
pub mod validation;

pub use schedule::{ScheduleError, parse_cron, parse_duration};
pub use validation::Validator;

use std::fmt;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Location inside the document, e.g. `jobs[2].cron`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path, self.message)
    }
}

/// Result of validating one job-group document.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub file: String,
    pub errors: Vec<Violation>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(self)` when there are no errors; warnings alone do not fail.
    pub fn ensure_valid(self) -> Result<Self, Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(self)
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Violation {
            path: path.into(),
            message: message.into(),
        });
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: validation failed with {} error(s)",
            self.file,
            self.errors.len()
        )?;
        for error in &self.errors {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}
