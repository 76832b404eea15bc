// src/output/combinators.rs

//! Transformations over [`Output`]s.
//!
//! Every combinator follows the same rules:
//! - the transformation never runs on an unknown input; the result is
//!   unknown with the input's dependencies,
//! - secrecy is sticky: the result is secret if any input was,
//! - dependencies only grow.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, join_all};

use crate::errors::{Result, RuntimeError};
use crate::output::{Output, Resolved, Settled};
use crate::resource::ResourceSet;
use crate::value::{InputValue, PropertyMap, PropertyValue};

enum Step<U> {
    Value(U),
    Output(Output<U>),
}

fn unknown_like<T, U>(input: &Resolved<T>) -> Settled<U> {
    Ok(Arc::new(Resolved {
        value: None,
        known: false,
        secret: input.secret,
        dependencies: input.dependencies.clone(),
    }))
}

impl<T> Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn chain<U, F, Fut>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Step<U>>> + Send + 'static,
    {
        let source = self.clone();
        Output::derived(self.dependencies(), async move {
            let input = source.settle().await?;
            let value = match (&input.value, input.known) {
                (Some(value), true) => value.clone(),
                _ => return unknown_like(&input),
            };
            match f(value).await? {
                Step::Value(value) => Ok(Arc::new(Resolved {
                    value: Some(value),
                    known: true,
                    secret: input.secret,
                    dependencies: input.dependencies.clone(),
                })),
                Step::Output(inner) => {
                    let settled = inner.settle().await?;
                    let mut dependencies = input.dependencies.clone();
                    dependencies.extend(inner.dependencies());
                    dependencies.extend(settled.dependencies.iter().copied());
                    Ok(Arc::new(Resolved {
                        value: if settled.known {
                            settled.value.clone()
                        } else {
                            None
                        },
                        known: settled.known,
                        secret: input.secret || settled.secret,
                        dependencies,
                    }))
                }
            }
        })
    }

    /// Transform the value once it is known.
    pub fn apply<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(move |v| future::ready(Ok(Step::Value(f(v)))))
    }

    /// Fallible transformation; an error rejects the resulting cell.
    pub fn try_apply<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        self.chain(move |v| {
            future::ready(
                f(v).map(Step::Value)
                    .map_err(|e| RuntimeError::Apply(format!("{e:#}"))),
            )
        })
    }

    /// Transformation producing another output; the result is flattened.
    pub fn apply_output<U, F>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Output<U> + Send + 'static,
    {
        self.chain(move |v| future::ready(Ok(Step::Output(f(v)))))
    }

    /// Asynchronous transformation.
    pub fn apply_future<U, F, Fut>(&self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        self.chain(move |v| async move { Ok(Step::Value(f(v).await)) })
    }

    /// Same value, marked secret.
    pub fn secret(&self) -> Output<T> {
        self.with_secret(true)
    }

    /// Same value, secrecy cleared.
    pub fn unsecret(&self) -> Output<T> {
        self.with_secret(false)
    }

    fn with_secret(&self, secret: bool) -> Output<T> {
        let source = self.clone();
        Output::derived(self.dependencies(), async move {
            let input = source.settle().await?;
            Ok(Arc::new(Resolved {
                value: input.value.clone(),
                known: input.known,
                secret,
                dependencies: input.dependencies.clone(),
            }))
        })
    }

    /// Combine many outputs into one sequence.
    ///
    /// Known iff every input is known; secret iff any input is secret;
    /// dependencies are the union.
    pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
        let dependencies: ResourceSet = outputs.iter().flat_map(|o| o.dependencies()).collect();
        Output::derived(dependencies, async move {
            let settled = join_all(outputs.iter().map(Output::settle)).await;
            let mut values = Vec::with_capacity(settled.len());
            let mut merged = Resolved::known(());
            for item in settled {
                let item = item?;
                merged.secret |= item.secret;
                merged.dependencies.extend(item.dependencies.iter().copied());
                match (&item.value, item.known) {
                    (Some(v), true) => values.push(v.clone()),
                    _ => merged.known = false,
                }
            }
            Ok(Arc::new(Resolved {
                value: merged.known.then_some(values),
                known: merged.known,
                secret: merged.secret,
                dependencies: merged.dependencies,
            }))
        })
    }

    /// Keyed variant of [`Output::all`].
    pub fn all_map(outputs: BTreeMap<String, Output<T>>) -> Output<BTreeMap<String, T>> {
        let (keys, values): (Vec<String>, Vec<Output<T>>) = outputs.into_iter().unzip();
        Output::all(values).apply(move |values| keys.into_iter().zip(values).collect())
    }

    /// Pair two outputs of different types.
    pub fn zip<U>(&self, other: &Output<U>) -> Output<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let other = other.clone();
        let mut dependencies = self.dependencies();
        dependencies.extend(other.dependencies());
        let this = self.clone();
        Output::derived(dependencies, async move {
            let (a, b) = future::join(this.settle(), other.settle()).await;
            let (a, b) = (a?, b?);
            let mut deps = a.dependencies.clone();
            deps.extend(b.dependencies.iter().copied());
            let value = match (&a.value, &b.value, a.known && b.known) {
                (Some(a), Some(b), true) => Some((a.clone(), b.clone())),
                _ => None,
            };
            Ok(Arc::new(Resolved {
                known: value.is_some(),
                value,
                secret: a.secret || b.secret,
                dependencies: deps,
            }))
        })
    }
}

/// Normalize any input into a single property output.
///
/// Plain values are known unless they contain `Unknown`; nested outputs and
/// futures are awaited and their dependencies merged; resource handles turn
/// into resource references depending on the resource itself.
pub fn lift(input: InputValue) -> Output<PropertyValue> {
    match input {
        InputValue::Value(value) => {
            let known = !value.contains_unknowns();
            Output::settled(
                ResourceSet::new(),
                Resolved {
                    value: Some(value),
                    known,
                    secret: false,
                    dependencies: ResourceSet::new(),
                },
            )
        }
        InputValue::Output(output) => output,
        InputValue::Future(fut) => Output::derived(ResourceSet::new(), async move {
            let inner = lift(fut.await);
            let settled = inner.settle().await?;
            let mut resolved = (*settled).clone();
            resolved.dependencies.extend(inner.dependencies());
            Ok(Arc::new(resolved))
        }),
        InputValue::Resource(resource) => resource.as_reference(),
        InputValue::Array(items) => {
            Output::all(items.into_iter().map(lift).collect()).apply(PropertyValue::Array)
        }
        InputValue::Object(map) => Output::all_map(
            map.into_iter()
                .map(|(k, v)| (k, lift(v)))
                .collect::<BTreeMap<_, _>>(),
        )
        .apply(|m| PropertyValue::Object(m.into_iter().collect::<PropertyMap>())),
    }
}
