use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::{BoxError, TransformError, TransformResult};
use crate::filter::{FieldMap, FieldValue};
use crate::introspection::IntrospectionIndex;

const REGISTRY_KEY_SUFFIX: &str = "DAO";

/// Rewrites the filter value of one computed key into a partial field map
/// whose keys replace the computed key on the filter node.
#[async_trait]
pub trait ComputedFieldTransform<C>: Send + Sync {
    async fn transform(&self, value: FieldValue, context: &C) -> Result<FieldMap, BoxError>;
}

pub struct FnTransform<F>(pub F);

#[async_trait]
impl<C, F> ComputedFieldTransform<C> for FnTransform<F>
where
    C: Sync,
    F: Fn(FieldValue) -> Result<FieldMap, BoxError> + Send + Sync,
{
    async fn transform(&self, value: FieldValue, _context: &C) -> Result<FieldMap, BoxError> {
        (self.0)(value)
    }
}

pub struct AsyncFnTransform<F>(pub F);

#[async_trait]
impl<C, F, Fut> ComputedFieldTransform<C> for AsyncFnTransform<F>
where
    C: Sync,
    F: Fn(FieldValue) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FieldMap, BoxError>> + Send,
{
    async fn transform(&self, value: FieldValue, _context: &C) -> Result<FieldMap, BoxError> {
        (self.0)(value).await
    }
}

pub struct ContextFnTransform<F>(pub F);

#[async_trait]
impl<C, F> ComputedFieldTransform<C> for ContextFnTransform<F>
where
    C: Sync,
    F: Fn(FieldValue, &C) -> Result<FieldMap, BoxError> + Send + Sync,
{
    async fn transform(&self, value: FieldValue, context: &C) -> Result<FieldMap, BoxError> {
        (self.0)(value, context)
    }
}

// Declaration order decides merge order.
pub struct ComputedFieldMap<C> {
    transforms: IndexMap<String, Arc<dyn ComputedFieldTransform<C>>>,
}

impl<C: Sync> ComputedFieldMap<C> {
    pub fn new() -> Self {
        Self {
            transforms: IndexMap::new(),
        }
    }

    pub fn with(
        mut self,
        key: impl Into<String>,
        transform: impl ComputedFieldTransform<C> + 'static,
    ) -> Self {
        self.insert(key, transform);
        self
    }

    pub fn with_fn<F>(self, key: impl Into<String>, transform: F) -> Self
    where
        F: Fn(FieldValue) -> Result<FieldMap, BoxError> + Send + Sync + 'static,
    {
        self.with(key, FnTransform(transform))
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        transform: impl ComputedFieldTransform<C> + 'static,
    ) {
        self.transforms.insert(key.into(), Arc::new(transform));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.transforms.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ComputedFieldTransform<C>>)> {
        self.transforms.iter().map(|(key, transform)| (key.as_str(), transform))
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl<C: Sync> Default for ComputedFieldMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ComputedFieldMap<C> {
    fn clone(&self) -> Self {
        Self {
            transforms: self.transforms.clone(),
        }
    }
}

impl<C> fmt::Debug for ComputedFieldMap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.transforms.keys()).finish()
    }
}

pub trait TransformationLookup<C>: Send + Sync {
    fn transformations_for(&self, entity_type: &str) -> Option<&ComputedFieldMap<C>>;
}

/// Directory key for an entity type's registry: `BlogPost` -> `blogPostDAO`.
pub fn registry_key(type_name: &str) -> String {
    let mut chars = type_name.chars();
    let mut key = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    key.push_str(REGISTRY_KEY_SUFFIX);
    key
}

pub struct ComputedFieldRegistry<C> {
    maps: HashMap<String, ComputedFieldMap<C>>,
}

impl<C: Sync> ComputedFieldRegistry<C> {
    pub fn new() -> Self {
        Self {
            maps: HashMap::new(),
        }
    }

    pub fn register(&mut self, entity_type: &str, transformations: ComputedFieldMap<C>) {
        let key = registry_key(entity_type);
        tracing::debug!(
            entity = entity_type,
            key = %key,
            computed_fields = transformations.len(),
            "Registered computed field transformations"
        );
        self.maps.insert(key, transformations);
    }

    pub fn with(mut self, entity_type: &str, transformations: ComputedFieldMap<C>) -> Self {
        self.register(entity_type, transformations);
        self
    }
}

impl<C: Sync> Default for ComputedFieldRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ComputedFieldRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.maps.iter()).finish()
    }
}

impl<C: Sync> TransformationLookup<C> for ComputedFieldRegistry<C> {
    fn transformations_for(&self, entity_type: &str) -> Option<&ComputedFieldMap<C>> {
        self.maps.get(&registry_key(entity_type))
    }
}

pub struct ResolvedChild<'a, C> {
    pub entity_type: &'a str,
    pub transformations: Option<&'a ComputedFieldMap<C>>,
}

pub struct RegistryResolver<C> {
    index: Arc<IntrospectionIndex>,
    lookup: Arc<dyn TransformationLookup<C>>,
}

impl<C> Clone for RegistryResolver<C> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            lookup: Arc::clone(&self.lookup),
        }
    }
}

impl<C: Sync> RegistryResolver<C> {
    pub fn new(index: Arc<IntrospectionIndex>, lookup: Arc<dyn TransformationLookup<C>>) -> Self {
        Self { index, lookup }
    }

    pub fn transformations_for(&self, entity_type: &str) -> Option<&ComputedFieldMap<C>> {
        self.lookup.transformations_for(entity_type)
    }

    /// Named type of `field_name` on `entity_type`; `field_name` must already
    /// have its list modifier stripped.
    pub fn nested_entity_type(&self, entity_type: &str, field_name: &str) -> TransformResult<&str> {
        let field = self
            .index
            .fields_of(entity_type)?
            .iter()
            .find(|field| field.name == field_name)
            .ok_or_else(|| TransformError::FieldNotFound {
                type_name: entity_type.to_string(),
                field: field_name.to_string(),
            })?;
        field.ty.named_type().ok_or_else(|| TransformError::UnnamedType {
            type_name: entity_type.to_string(),
            field: field_name.to_string(),
        })
    }

    pub fn resolve_child(
        &self,
        entity_type: &str,
        field_name: &str,
    ) -> TransformResult<ResolvedChild<'_, C>> {
        let nested = self.nested_entity_type(entity_type, field_name)?;
        let transformations = self.transformations_for(nested);
        if transformations.is_none() {
            tracing::debug!(
                entity = nested,
                parent = entity_type,
                field = field_name,
                "No computed field registry for nested entity, recursing structurally"
            );
        }
        Ok(ResolvedChild {
            entity_type: nested,
            transformations,
        })
    }
}
