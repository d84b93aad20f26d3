//! # Dimensions
//!
//! Default dimensions derived from the Azure Functions app settings and the invocation context.
//!
//! Merge order for a datapoint, later layers win on name collision:
//! canonical defaults → metric source → caller supplied extras → the datapoint's own dimensions

use super::config::Environment;
use super::invocation::FunctionContext;
use super::{regions, Error};
use serde::Serialize;
use std::collections::BTreeMap;

pub const FUNCTION_NAME: &str = "azure_function_name";
pub const RESOURCE_NAME: &str = "azure_resource_name";
pub const REGION: &str = "azure_region";
pub const SUBSCRIPTION_ID: &str = "subscription_id";
pub const RESOURCE_GROUP: &str = "resource_group";
pub const WRAPPER_VERSION: &str = "function_wrapper_version";
pub const IS_AZURE_FUNCTION: &str = "is_Azure_Function";
pub const METRIC_SOURCE: &str = "metric_source";

pub const METRIC_SOURCE_VALUE: &str = "azure_function_wrapper";
pub const WRAPPER_VERSION_VALUE: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// App settings read by [resolve_default_dimensions]
pub const OWNER_NAME_VAR: &str = "WEBSITE_OWNER_NAME";
pub const SITE_NAME_VAR: &str = "WEBSITE_SITE_NAME";
pub const APP_POOL_ID_VAR: &str = "APP_POOL_ID";
pub const LOCATION_VAR: &str = "Location";
pub const RESOURCE_GROUP_VAR: &str = "WEBSITE_RESOURCE_GROUP";

/// SignalFx limit on dimension name length
const MAX_NAME_LEN: usize = 128;

/// Ordered set of dimension name/value pairs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Dimensions(BTreeMap<String, String>);

impl Dimensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a dimension, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Overlay `other` onto this set, `other` wins on name collision
    pub fn merge(&mut self, other: &Dimensions) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// A copy of `defaults` with this set layered on top
    pub fn over(&self, defaults: &Dimensions) -> Dimensions {
        let mut merged = defaults.clone();
        merged.merge(self);
        merged
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Dimensions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a Dimensions {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// SignalFx dimension names start with a letter, hold only letters, digits, `_` and `-`,
/// and may not use the reserved `sf_` prefix
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() <= MAX_NAME_LEN
        && first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !name.starts_with("sf_")
}

/// Build the eight canonical dimensions for one invocation
///
/// Absent app settings resolve to `"Unknown"`, a `Location` missing from the region table is
/// an [Error::UnknownRegion].
pub fn resolve_default_dimensions(
    env: &impl Environment,
    context: &impl FunctionContext,
) -> Result<Dimensions, Error> {
    let subscription_id = env
        .var(OWNER_NAME_VAR)
        .filter(|owner| !owner.is_empty())
        .and_then(|owner| owner.split('+').next().map(str::to_string))
        .unwrap_or_else(|| regions::UNKNOWN.to_string());

    let resource_name = env
        .var(SITE_NAME_VAR)
        .filter(|site| !site.is_empty())
        .or_else(|| env.var(APP_POOL_ID_VAR))
        .unwrap_or_else(|| regions::UNKNOWN.to_string());

    let region = match env.var(LOCATION_VAR) {
        Some(label) => regions::region_code(&label)?,
        None => regions::UNKNOWN,
    };

    let resource_group = env
        .var(RESOURCE_GROUP_VAR)
        .unwrap_or_else(|| regions::UNKNOWN.to_string());

    let mut dimensions = Dimensions::new();
    dimensions.insert(FUNCTION_NAME, context.function_name());
    dimensions.insert(RESOURCE_NAME, resource_name);
    dimensions.insert(REGION, region);
    dimensions.insert(SUBSCRIPTION_ID, subscription_id);
    dimensions.insert(RESOURCE_GROUP, resource_group);
    dimensions.insert(WRAPPER_VERSION, WRAPPER_VERSION_VALUE);
    dimensions.insert(IS_AZURE_FUNCTION, "true");
    dimensions.insert(METRIC_SOURCE, METRIC_SOURCE_VALUE);
    Ok(dimensions)
}
