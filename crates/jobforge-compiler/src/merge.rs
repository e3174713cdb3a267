//! Layered defaults: global settings < job group < individual job.
//!
//! Each field is merged independently. A more specific layer only
//! overrides when it is actually set; an empty value never erases a less
//! specific one.

use jobforge_core::pod::EnvVar;
use std::collections::BTreeMap;

/// Values that can be "unset" without being absent.
pub trait Unset {
    fn is_unset(&self) -> bool;
}

impl Unset for str {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl Unset for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Unset for BTreeMap<K, V> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Unset for [T] {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

/// The most specific set value. Layers are ordered least to most specific.
pub fn most_specific<'a, T>(layers: impl IntoIterator<Item = Option<&'a T>>) -> Option<&'a T>
where
    T: Unset + ?Sized + 'a,
{
    layers
        .into_iter()
        .flatten()
        .filter(|value| !value.is_unset())
        .last()
}

/// Key-wise union of maps; later layers win on key collision.
pub fn overlay_maps<'a>(
    layers: impl IntoIterator<Item = &'a BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Union of job and group env, de-duplicated by name. Job entries come
/// first and win; group entries fill in names the job does not set.
pub fn merge_env(job: &[EnvVar], group: &[EnvVar]) -> Vec<EnvVar> {
    let mut env: Vec<EnvVar> = Vec::with_capacity(job.len() + group.len());
    for var in job.iter().chain(group) {
        if !env.iter().any(|e| e.name == var.name) {
            env.push(var.clone());
        }
    }
    env
}
