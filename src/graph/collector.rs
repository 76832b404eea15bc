// src/graph/collector.rs

use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tracing::trace;

use crate::errors::Result;
use crate::resource::{DependsOn, ResourceId, ResourceSet, ResourceTable};

/// Await every explicit `depends_on` entry and collect the resources named.
///
/// Outputs contribute both the resources in their value and the resources
/// they already depend on.
pub async fn gather_explicit_dependencies(depends_on: &[DependsOn]) -> Result<ResourceSet> {
    let gathered = join_all(depends_on.iter().cloned().map(gather_one)).await;
    let mut out = ResourceSet::new();
    for set in gathered {
        out.extend(set?);
    }
    Ok(out)
}

fn gather_one(dep: DependsOn) -> BoxFuture<'static, Result<ResourceSet>> {
    async move {
        match dep {
            DependsOn::Resource(r) => Ok(ResourceSet::from([r.id()])),
            DependsOn::List(items) => {
                let mut out = ResourceSet::new();
                for set in join_all(items.into_iter().map(gather_one)).await {
                    out.extend(set?);
                }
                Ok(out)
            }
            DependsOn::Output(output) => {
                let mut out = output.dependencies();
                let settled = output.settle().await?;
                out.extend(settled.dependencies.iter().copied());
                if let Some(resources) = settled.value.as_ref().filter(|_| settled.known) {
                    out.extend(resources.iter().map(|r| r.id()));
                }
                Ok(out)
            }
            DependsOn::Future(fut) => gather_one(fut.await).await,
        }
    }
    .boxed()
}

/// Expand `roots` into the resources a registration must actually wait for.
///
/// - Local components are looked through: once a component's child set is
///   final, its children join the walk.
/// - Custom resources, providers, dependency stubs and remote components are
///   leaves and make up the result.
/// - Members of `exclude` (the registering resource and its ancestors) are
///   never expanded; their child sets may still be growing.
pub async fn transitive_wait_set(
    table: &Mutex<ResourceTable>,
    roots: ResourceSet,
    exclude: &ResourceSet,
) -> ResourceSet {
    let mut seen = ResourceSet::new();
    let mut result = ResourceSet::new();
    let mut stack: Vec<ResourceId> = roots.into_iter().collect();

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let (kind, construction) = {
            let table = table.lock().unwrap_or_else(PoisonError::into_inner);
            (table.kind_of(id), table.construction_watch(id))
        };
        let Some(kind) = kind else {
            continue;
        };
        if kind.is_wait_target() {
            result.insert(id);
            continue;
        }
        if exclude.contains(&id) {
            trace!(resource = %id, "not expanding excluded component");
            continue;
        }
        if let Some(mut construction) = construction {
            if !*construction.borrow() {
                trace!(resource = %id, "waiting for component construction");
            }
            // The sender lives as long as the table; an error means the run is over.
            let _ = construction.wait_for(|done| *done).await;
        }
        let children = table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .children_of(id);
        stack.extend(children);
    }
    result
}
