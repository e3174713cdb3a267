//! Matrix expansion of parameterized job templates.
//!
//! A template references matrix axes with `$(matrix.<axis>)` placeholders
//! anywhere in its string fields. Expansion produces one template per
//! combination of the referenced axes' values.

use jobforge_core::{Error, Result};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(matrix\.([A-Za-z0-9_.-]+)\)").expect("placeholder regex is valid")
});

/// Expander for matrix configurations.
pub struct MatrixExpander<'a> {
    axes: &'a BTreeMap<String, Vec<String>>,
}

impl<'a> MatrixExpander<'a> {
    pub fn new(axes: &'a BTreeMap<String, Vec<String>>) -> Self {
        Self { axes }
    }

    /// Axes referenced in `text`, deduplicated, in order of first
    /// appearance. Identifiers that are not axes are skipped.
    pub fn referenced_axes(&self, text: &str) -> Vec<String> {
        let mut axes: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(text) {
            let ident = &caps[1];
            if self.axes.contains_key(ident) && !axes.iter().any(|a| a == ident) {
                axes.push(ident.to_string());
            }
        }
        axes
    }

    /// Expand raw text, substituting values verbatim.
    pub fn expand_text(&self, text: &str) -> Vec<String> {
        self.combine(text, |value| value.to_string())
    }

    /// Expand a template into concrete templates.
    ///
    /// The template is serialized, expanded textually, and deserialized
    /// again. Values are JSON-escaped before substitution so they can never
    /// break out of the string they land in.
    pub fn expand<T>(&self, template: &T) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let serialized = serde_json::to_string(template)?;
        if self.referenced_axes(&serialized).is_empty() {
            return Ok(vec![template.clone()]);
        }

        self.combine(&serialized, json_escape)
            .iter()
            .map(|text| serde_json::from_str(text).map_err(Error::from))
            .collect()
    }

    /// Cartesian product over the referenced axes, first axis outermost,
    /// each axis iterated in declared order.
    fn combine<F>(&self, text: &str, mut render: F) -> Vec<String>
    where
        F: FnMut(&str) -> String,
    {
        let axes = self.referenced_axes(text);
        if axes.is_empty() {
            return vec![text.to_string()];
        }

        let mut result = vec![text.to_string()];
        for axis in axes {
            let placeholder = format!("$(matrix.{})", axis);
            let values: Vec<String> =
                self.axes[&axis].iter().map(|v| render(v.as_str())).collect();

            let mut next = Vec::with_capacity(result.len() * values.len());
            for partial in &result {
                for value in &values {
                    next.push(partial.replace(&placeholder, value));
                }
            }
            result = next;
        }
        result
    }
}

/// `value` as it appears between the quotes of a JSON string.
fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::from(value).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
