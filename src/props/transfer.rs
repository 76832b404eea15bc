// src/props/transfer.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::output::{Output, PendingTracker, Resolver};
use crate::resource::{Resource, ResourceSet};
use crate::value::{InputMap, PropertyMap, PropertyValue};

/// Output cells of a resource, by property name.
pub type ResourceOutputs = BTreeMap<String, Output<PropertyValue>>;

/// Resolvers backing [`ResourceOutputs`].
pub type PropertyResolvers = BTreeMap<String, Resolver<PropertyValue>>;

/// Allocate one pending cell per input property (except `id` and `urn`),
/// each depending on `resource`.
pub fn transfer_properties(
    resource: &Resource,
    label: &str,
    props: &InputMap,
    tracker: Option<&Arc<PendingTracker>>,
) -> (ResourceOutputs, PropertyResolvers) {
    let mut outputs = ResourceOutputs::new();
    let mut resolvers = PropertyResolvers::new();
    for key in props.keys() {
        if key == "id" || key == "urn" {
            continue;
        }
        let (output, resolver) = Output::pending(
            ResourceSet::from([resource.id()]),
            tracker,
            format!("{label}.{key}"),
        );
        outputs.insert(key.clone(), output);
        resolvers.insert(key.clone(), resolver);
    }
    (outputs, resolvers)
}

/// Settle every resolver from a decoded engine response.
///
/// - A value present in the response is known unless previewing and the
///   value is null or contains unknowns; a secret wrapper marks it secret.
/// - A resolver with no matching value settles as unknown.
/// - Response keys without a resolver are ignored.
///
/// Resolution continues past individual failures; the first failure is
/// returned.
pub fn resolve_properties(
    label: &str,
    resolvers: &PropertyResolvers,
    values: &PropertyMap,
    dry_run: bool,
    dependencies: &BTreeMap<String, ResourceSet>,
) -> Result<()> {
    let mut first_err = None;
    for (key, resolver) in resolvers {
        let deps = dependencies.get(key).cloned().unwrap_or_default();
        let outcome = match values.get(key) {
            Some(value) => {
                let (inner, secret) = value.unwrap_secret();
                let known = !(dry_run && (inner.is_null() || inner.contains_unknowns()));
                let value = known.then(|| inner.clone());
                resolver.resolve(value, known, secret, deps)
            }
            None => resolver.resolve(None, false, false, deps),
        };
        if let Err(err) = outcome {
            first_err.get_or_insert(err);
        }
    }
    for key in values.keys().filter(|k| !resolvers.contains_key(*k)) {
        debug!(resource = %label, property = %key, "engine returned undeclared property");
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Settle every still-pending resolver as unknown. Returns how many were
/// settled.
pub fn settle_unknown(resolvers: &PropertyResolvers) -> usize {
    resolvers
        .values()
        .filter(|r| r.settle_unknown_if_pending())
        .count()
}
