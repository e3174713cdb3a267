//! Reporting differences between two descriptor documents.
//!
//! Used to review a fresh compilation against what is already checked in.
//! Descriptors are matched by name within each kind and compared field by
//! field on their serialized form.

use jobforge_core::Result;
use jobforge_core::job::TriggerType;
use jobforge_core::prowjob::JobConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// One changed field. Absent fields are reported as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDelta {
    /// Pointer-style path, e.g. `/spec/containers/0/image`.
    pub path: String,
    pub old: Value,
    pub new: Value,
}

/// A descriptor present on both sides with differing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDiff {
    pub name: String,
    pub deltas: Vec<FieldDelta>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KindDiff {
    pub kind: TriggerType,
    /// Only in the new document.
    pub created: Vec<String>,
    /// Only in the existing document.
    pub missing: Vec<String>,
    pub changed: Vec<JobDiff>,
}

impl KindDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.missing.is_empty() && self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffReport {
    pub kinds: Vec<KindDiff>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.kinds.iter().all(KindDiff::is_empty)
    }
}

/// Compare `new` against `existing`.
pub fn diff(new: &JobConfig, existing: &JobConfig) -> Result<DiffReport> {
    let mut report = DiffReport::default();
    for kind in TriggerType::ALL {
        let fresh = descriptors(new, kind)?;
        let current = descriptors(existing, kind)?;
        report.kinds.push(diff_kind(kind, &fresh, &current));
    }
    Ok(report)
}

fn diff_kind(
    kind: TriggerType,
    new: &[(String, Value)],
    existing: &[(String, Value)],
) -> KindDiff {
    let existing_names: BTreeSet<&str> = existing.iter().map(|(n, _)| n.as_str()).collect();
    let new_names: BTreeSet<&str> = new.iter().map(|(n, _)| n.as_str()).collect();

    let mut result = KindDiff {
        kind,
        created: Vec::new(),
        missing: Vec::new(),
        changed: Vec::new(),
    };

    for (name, value) in new {
        match existing.iter().find(|(n, _)| n == name) {
            None => result.created.push(name.clone()),
            Some((_, old)) => {
                let mut deltas = Vec::new();
                compare("", old, value, &mut deltas);
                if !deltas.is_empty() {
                    result.changed.push(JobDiff {
                        name: name.clone(),
                        deltas,
                    });
                }
            }
        }
    }

    result.missing = existing_names
        .difference(&new_names)
        .map(|n| n.to_string())
        .collect();
    result
}

fn descriptors(config: &JobConfig, kind: TriggerType) -> Result<Vec<(String, Value)>> {
    match kind {
        TriggerType::Presubmit => config
            .presubmits
            .values()
            .flatten()
            .map(|p| entry(&p.base.name, p))
            .collect(),
        TriggerType::Postsubmit => config
            .postsubmits
            .values()
            .flatten()
            .map(|p| entry(&p.base.name, p))
            .collect(),
        TriggerType::Periodic => config
            .periodics
            .iter()
            .map(|p| entry(&p.base.name, p))
            .collect(),
    }
}

fn entry<T: Serialize>(name: &str, descriptor: &T) -> Result<(String, Value)> {
    Ok((name.to_string(), serde_json::to_value(descriptor)?))
}

fn compare(path: &str, old: &Value, new: &Value, deltas: &mut Vec<FieldDelta>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
            for key in keys {
                compare(
                    &format!("{}/{}", path, key),
                    old_map.get(key).unwrap_or(&Value::Null),
                    new_map.get(key).unwrap_or(&Value::Null),
                    deltas,
                );
            }
        }
        (Value::Array(old_items), Value::Array(new_items))
            if old_items.len() == new_items.len() =>
        {
            for (index, (o, n)) in old_items.iter().zip(new_items).enumerate() {
                compare(&format!("{}/{}", path, index), o, n, deltas);
            }
        }
        _ if old != new => deltas.push(FieldDelta {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            old: old.clone(),
            new: new.clone(),
        }),
        _ => {}
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No differences");
        }
        for kind in self.kinds.iter().filter(|k| !k.is_empty()) {
            write!(f, "{}", kind)?;
        }
        Ok(())
    }
}

impl fmt::Display for KindDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}s:", self.kind)?;
        for name in &self.created {
            writeln!(f, "  + {}", name)?;
        }
        for name in &self.missing {
            writeln!(f, "  - {}", name)?;
        }
        for job in &self.changed {
            writeln!(f, "  ~ {}", job.name)?;
            for delta in &job.deltas {
                writeln!(f, "      {}: {} -> {}", delta.path, delta.old, delta.new)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobforge_core::pod::{Container, PodSpec};
    use jobforge_core::prowjob::{JobBase, Periodic, Presubmit};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn presubmit(name: &str, image: &str) -> Presubmit {
        Presubmit {
            base: JobBase {
                name: name.to_string(),
                decorate: true,
                spec: PodSpec {
                    containers: vec![Container {
                        image: image.to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
            always_run: true,
            ..Default::default()
        }
    }

    fn config(presubmits: Vec<Presubmit>) -> JobConfig {
        let mut config = JobConfig::default();
        config.presubmits.insert("istio/istio".to_string(), presubmits);
        config
    }

    #[test]
    fn test_identical_configs() {
        let a = config(vec![presubmit("unit_istio", "tools:1")]);

        let report = diff(&a, &a.clone()).unwrap();

        assert!(report.is_empty());
        assert_eq!(report.to_string(), "No differences\n");
    }

    #[test]
    fn test_created_missing_and_changed() {
        let existing = config(vec![
            presubmit("unit_istio", "tools:1"),
            presubmit("lint_istio", "tools:1"),
        ]);
        let mut new = config(vec![
            presubmit("unit_istio", "tools:2"),
            presubmit("e2e_istio", "tools:2"),
        ]);
        new.periodics.push(Periodic {
            base: JobBase {
                name: "nightly_istio_periodic".to_string(),
                ..Default::default()
            },
            interval: Some("24h".to_string()),
            ..Default::default()
        });

        let report = diff(&new, &existing).unwrap();

        let presubmits = &report.kinds[0];
        assert_eq!(presubmits.kind, TriggerType::Presubmit);
        assert_eq!(presubmits.created, vec!["e2e_istio"]);
        assert_eq!(presubmits.missing, vec!["lint_istio"]);
        assert_eq!(
            presubmits.changed,
            vec![JobDiff {
                name: "unit_istio".to_string(),
                deltas: vec![FieldDelta {
                    path: "/spec/containers/0/image".to_string(),
                    old: json!("tools:1"),
                    new: json!("tools:2"),
                }],
            }]
        );
        assert!(report.kinds[1].is_empty());
        assert_eq!(report.kinds[2].created, vec!["nightly_istio_periodic"]);

        let rendered = report.to_string();
        assert!(rendered.contains("presubmits:\n  + e2e_istio\n  - lint_istio\n  ~ unit_istio\n"));
        assert!(rendered.contains("/spec/containers/0/image: \"tools:1\" -> \"tools:2\""));
        assert!(!rendered.contains("postsubmits:"));
    }

    #[test]
    fn test_added_field_reported_against_null() {
        let existing = config(vec![presubmit("unit_istio", "tools:1")]);
        let mut changed = presubmit("unit_istio", "tools:1");
        changed.optional = true;
        let new = config(vec![changed]);

        let report = diff(&new, &existing).unwrap();

        assert_eq!(
            report.kinds[0].changed[0].deltas,
            vec![FieldDelta {
                path: "/optional".to_string(),
                old: Value::Null,
                new: json!(true),
            }]
        );
    }
}
