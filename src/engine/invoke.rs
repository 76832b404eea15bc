// src/engine/invoke.rs

use tracing::debug;

use crate::engine::context::Context;
use crate::engine::monitor::InvokeRequest;
use crate::errors::{Result, RuntimeError};
use crate::props::{deserialize_properties, serialize_properties};
use crate::resource::{InvokeOptions, Resource, package_of};
use crate::value::{InputMap, PropertyMap};

impl Context {
    /// Call a provider function (`pkg:module:function`).
    ///
    /// The provider is `opts.provider`, or the one the parent (default: the
    /// root stack) holds for the token's package.
    pub async fn invoke(
        &self,
        token: &str,
        args: InputMap,
        opts: InvokeOptions,
    ) -> Result<PropertyMap> {
        if token.is_empty() {
            return Err(RuntimeError::InvalidArgument(
                "missing invoke token".to_string(),
            ));
        }
        self.inner.rpcs.begin()?;
        let result = self.invoke_inner(token, &args, &opts).await;
        self.inner.rpcs.end();
        result
    }

    async fn invoke_inner(
        &self,
        token: &str,
        args: &InputMap,
        opts: &InvokeOptions,
    ) -> Result<PropertyMap> {
        let label = format!("invoke {token}");
        let serialized = serialize_properties(&label, args, self.features().wire_options()).await?;

        let provider = match self.invoke_provider(token, opts) {
            Some(p) => self.provider_reference(&p).await?,
            None => String::new(),
        };

        debug!(token = %token, provider = %provider, "invoking provider function");
        let response = self
            .monitor()
            .invoke(InvokeRequest {
                tok: token.to_string(),
                args: serialized.object,
                provider,
                version: opts.version.clone().unwrap_or_default(),
                accept_resources: self.features().resource_references,
            })
            .await?;

        if !response.failures.is_empty() {
            return Err(RuntimeError::InvokeFailed {
                token: token.to_string(),
                failures: response
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}", f.property, f.reason))
                    .collect(),
            });
        }
        deserialize_properties(&response.return_value, self.is_dry_run())
    }

    fn invoke_provider(&self, token: &str, opts: &InvokeOptions) -> Option<Resource> {
        if let Some(p) = &opts.provider {
            return Some(p.clone());
        }
        let parent = opts.parent.clone().or_else(|| self.root_resource())?;
        let package = package_of(token)?;
        self.lock_table().providers_of(parent.id()).get(package).cloned()
    }
}
