use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use crate::error::{TransformError, TransformResult};
use crate::filter::{strip_list_modifier, FieldMap, FieldValue, FilterNode, COMBINATOR_KEYS};
use crate::introspection::{entity_type_name_from_where_input, IntrospectionIndex};
use crate::registry::{ComputedFieldMap, RegistryResolver, TransformationLookup};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct TransformRequest<'a, C> {
    pub original_filter: &'a FilterNode,
    pub where_input_name: &'a str,
    pub computed_transformations: Option<&'a ComputedFieldMap<C>>,
    pub context: &'a C,
}

pub struct WhereTransformer<C> {
    index: Arc<IntrospectionIndex>,
    resolver: RegistryResolver<C>,
}

impl<C> Clone for WhereTransformer<C> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            resolver: self.resolver.clone(),
        }
    }
}

impl<C: Sync> WhereTransformer<C> {
    pub fn new(index: Arc<IntrospectionIndex>, lookup: Arc<dyn TransformationLookup<C>>) -> Self {
        let resolver = RegistryResolver::new(Arc::clone(&index), lookup);
        Self { index, resolver }
    }

    /// Rewrites a caller-owned filter. The original is left untouched, so the
    /// same filter can back several queries.
    pub async fn transform(&self, request: TransformRequest<'_, C>) -> TransformResult<FilterNode> {
        if request.original_filter.is_empty() {
            return Ok(FilterNode::Empty);
        }
        tracing::debug!(
            where_input = request.where_input_name,
            computed_fields = request.computed_transformations.map_or(0, ComputedFieldMap::len),
            "Transforming computed where arguments"
        );
        let node = request.original_filter.clone();
        self.transform_in_place(
            node,
            request.where_input_name,
            request.computed_transformations,
            request.context,
        )
        .await
    }

    // Computed field map comes from the where input's own entity registry.
    pub async fn transform_for_entity(
        &self,
        original_filter: &FilterNode,
        where_input_name: &str,
        context: &C,
    ) -> TransformResult<FilterNode> {
        let entity_type = entity_type_name_from_where_input(where_input_name)?;
        let computed_transformations = self.resolver.transformations_for(entity_type);
        self.transform(TransformRequest {
            original_filter,
            where_input_name,
            computed_transformations,
            context,
        })
        .await
    }

    pub async fn transform_json(
        &self,
        where_json: &Value,
        where_input_name: &str,
        context: &C,
    ) -> TransformResult<Value> {
        let node = FilterNode::try_from(where_json.clone())?;
        let entity_type = entity_type_name_from_where_input(where_input_name)?;
        let transformed = self
            .transform_in_place(
                node,
                where_input_name,
                self.resolver.transformations_for(entity_type),
                context,
            )
            .await?;
        Ok(transformed.into_json())
    }

    /// Rewrites a node the caller already owns. Recursive steps enter here.
    pub fn transform_in_place<'a>(
        &'a self,
        node: FilterNode,
        where_input_name: &'a str,
        transformations: Option<&'a ComputedFieldMap<C>>,
        context: &'a C,
    ) -> BoxFuture<'a, TransformResult<FilterNode>> {
        Box::pin(async move {
            let mut fields = match node {
                FilterNode::Empty => return Ok(FilterNode::Empty),
                FilterNode::Fields(fields) => fields,
            };

            self.rewrite_combinators(&mut fields, where_input_name, transformations, context)
                .await?;
            if let Some(transformations) = transformations.filter(|t| !t.is_empty()) {
                self.rewrite_computed_fields(&mut fields, where_input_name, transformations, context)
                    .await?;
            }
            self.rewrite_nested_fields(&mut fields, where_input_name, context)
                .await?;

            Ok(FilterNode::Fields(fields))
        })
    }

    async fn rewrite_combinators(
        &self,
        fields: &mut FieldMap,
        where_input_name: &str,
        transformations: Option<&ComputedFieldMap<C>>,
        context: &C,
    ) -> TransformResult<()> {
        let branches: Vec<(&'static str, Vec<FieldValue>)> = COMBINATOR_KEYS
            .iter()
            .filter_map(|key| match fields.get_mut(*key) {
                Some(FieldValue::Combinator(items)) => Some((*key, std::mem::take(items))),
                _ => None,
            })
            .collect();
        if branches.is_empty() {
            return Ok(());
        }

        let rewritten = try_join_all(branches.into_iter().map(|(key, items)| async move {
            let items = try_join_all(items.into_iter().map(|item| async move {
                match item {
                    FieldValue::Nested(node) => self
                        .transform_in_place(node, where_input_name, transformations, context)
                        .await
                        .map(FieldValue::Nested),
                    opaque => Ok(opaque),
                }
            }))
            .await?;
            Ok::<_, TransformError>((key, items))
        }))
        .await?;

        for (key, items) in rewritten {
            fields.insert(key.to_string(), FieldValue::Combinator(items));
        }
        Ok(())
    }

    async fn rewrite_computed_fields(
        &self,
        fields: &mut FieldMap,
        where_input_name: &str,
        transformations: &ComputedFieldMap<C>,
        context: &C,
    ) -> TransformResult<()> {
        let pending: Vec<_> = transformations
            .iter()
            .filter_map(|(key, transform)| {
                fields
                    .shift_remove(key)
                    .map(|value| (key, Arc::clone(transform), value))
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let partials = try_join_all(pending.into_iter().map(|(key, transform, value)| async move {
            tracing::trace!(where_input = where_input_name, key, "Rewriting computed field");
            transform
                .transform(value, context)
                .await
                .map_err(|source| TransformError::Transformation {
                    field: key.to_string(),
                    source,
                })
        }))
        .await?;

        // Declaration order decides collisions between partial maps.
        for partial in partials {
            fields.extend(partial);
        }
        Ok(())
    }

    async fn rewrite_nested_fields(
        &self,
        fields: &mut FieldMap,
        where_input_name: &str,
        context: &C,
    ) -> TransformResult<()> {
        let mut pending = Vec::new();
        for input_field in self.index.input_object_fields_of(where_input_name)? {
            let key = input_field.name.as_str();
            let Some(FieldValue::Nested(node)) = fields.get_mut(key) else {
                continue;
            };
            if node.is_empty() {
                continue;
            }

            let entity_type = entity_type_name_from_where_input(where_input_name)?;
            let child = self
                .resolver
                .resolve_child(entity_type, strip_list_modifier(key))?;
            let nested_where_input =
                input_field
                    .ty
                    .named_type()
                    .ok_or_else(|| TransformError::UnnamedType {
                        type_name: where_input_name.to_string(),
                        field: key.to_string(),
                    })?;
            tracing::trace!(
                where_input = where_input_name,
                key,
                nested_entity = child.entity_type,
                "Descending into nested where input"
            );
            pending.push((key, nested_where_input, child.transformations, std::mem::take(node)));
        }
        if pending.is_empty() {
            return Ok(());
        }

        let rewritten = try_join_all(pending.into_iter().map(
            |(key, nested_where_input, transformations, node)| async move {
                let node = self
                    .transform_in_place(node, nested_where_input, transformations, context)
                    .await?;
                Ok::<_, TransformError>((key, node))
            },
        ))
        .await?;

        for (key, node) in rewritten {
            fields.insert(key.to_string(), FieldValue::Nested(node));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::registry::{AsyncFnTransform, ComputedFieldRegistry, ContextFnTransform};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    const SCHEMA: &str = r#"
        type User {
          id: ID!
          firstName: String
          lastName: String
          age: Int
          posts: [Post!]
        }

        type Post {
          id: ID!
          title: String
          author: User!
        }

        input UserWhereInput {
          firstName: String
          lastName: String
          lastName_contains: String
          age_gt: Int
          posts: PostWhereInput
          posts_some: PostWhereInput
          AND: [UserWhereInput!]
          OR: [UserWhereInput!]
          NOT: [UserWhereInput!]
        }

        input PostWhereInput {
          title: String
          title_contains: String
          author: UserWhereInput
          AND: [PostWhereInput!]
        }
    "#;

    fn node(value: Value) -> FilterNode {
        FilterNode::try_from(value).unwrap()
    }

    fn full_name() -> ComputedFieldMap<()> {
        ComputedFieldMap::new().with_fn("fullName", |value| {
            let name = value.as_str().unwrap_or_default().to_string();
            let mut parts = name.split(' ');
            let mut out = FieldMap::new();
            if let Some(first) = parts.next() {
                out.insert("firstName".into(), first.into());
            }
            if let Some(last) = parts.next() {
                out.insert("lastName".into(), last.into());
            }
            Ok(out)
        })
    }

    fn transformer(registry: ComputedFieldRegistry<()>) -> WhereTransformer<()> {
        let index = Arc::new(IntrospectionIndex::from_sdl(SCHEMA).unwrap());
        WhereTransformer::new(index, Arc::new(registry))
    }

    async fn run(
        transformer: &WhereTransformer<()>,
        filter: &FilterNode,
        where_input: &str,
    ) -> TransformResult<FilterNode> {
        transformer.transform_for_entity(filter, where_input, &()).await
    }

    #[tokio::test]
    async fn test_empty_filter_short_circuits() {
        // Unknown where input is never consulted for an empty filter.
        let transformer = transformer(ComputedFieldRegistry::new());
        let out = transformer
            .transform(TransformRequest {
                original_filter: &FilterNode::Empty,
                where_input_name: "MissingWhereInput",
                computed_transformations: None,
                context: &(),
            })
            .await
            .unwrap();
        assert_eq!(out, FilterNode::Empty);
    }

    #[tokio::test]
    async fn test_original_filter_is_not_mutated() {
        let transformer = transformer(ComputedFieldRegistry::new().with("User", full_name()));
        let filter = node(json!({
            "fullName": "Jane Doe",
            "OR": [{ "fullName": "John Roe" }],
            "posts_some": { "author": { "fullName": "Ann Poe" } }
        }));
        let snapshot = filter.clone();

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(filter, snapshot);
        assert_ne!(out, snapshot);
    }

    #[tokio::test]
    async fn test_collision_prefers_produced_entries() {
        let transformer = transformer(ComputedFieldRegistry::new().with("User", full_name()));
        let filter = node(json!({ "firstName": "Old", "age_gt": 3, "fullName": "Jane Doe" }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(
            out.into_json(),
            json!({ "firstName": "Jane", "age_gt": 3, "lastName": "Doe" })
        );
    }

    #[tokio::test]
    async fn test_empty_partial_map_deletes_key() {
        let registry = ComputedFieldRegistry::new().with(
            "User",
            ComputedFieldMap::new().with_fn("isActive", |_| Ok(FieldMap::new())),
        );
        let transformer = transformer(registry);
        let filter = node(json!({ "isActive": true, "age_gt": 18 }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(out.into_json(), json!({ "age_gt": 18 }));
    }

    #[tokio::test]
    async fn test_computed_field_takes_precedence_over_nesting() {
        // `posts` is both a computed key and a nested object input field.
        let registry = ComputedFieldRegistry::new().with(
            "User",
            ComputedFieldMap::new().with_fn("posts", |_| {
                let mut out = FieldMap::new();
                out.insert("age_gt".into(), FieldValue::from(0));
                Ok(out)
            }),
        );
        let transformer = transformer(registry);
        let filter = node(json!({ "posts": { "title": "x" } }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(out.into_json(), json!({ "age_gt": 0 }));
    }

    #[tokio::test]
    async fn test_combinator_order_survives_out_of_order_completion() {
        let delayed = AsyncFnTransform(|value: FieldValue| async move {
            let delay = value.as_scalar().and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let mut out = FieldMap::new();
            out.insert("age_gt".into(), value);
            Ok::<_, BoxError>(out)
        });
        let registry =
            ComputedFieldRegistry::new().with("User", ComputedFieldMap::new().with("slowAge", delayed));
        let transformer = transformer(registry);
        let filter = node(json!({
            "AND": [{ "slowAge": 30 }, { "slowAge": 1 }, { "lastName": "Doe" }, { "slowAge": 10 }]
        }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(
            out.into_json(),
            json!({
                "AND": [{ "age_gt": 30 }, { "age_gt": 1 }, { "lastName": "Doe" }, { "age_gt": 10 }]
            })
        );
    }

    #[tokio::test]
    async fn test_nested_combinators_inside_nested_objects() {
        let title = ComputedFieldMap::new().with_fn("titleComputed", |value| {
            let mut out = FieldMap::new();
            out.insert("title_contains".into(), value);
            Ok(out)
        });
        let transformer = transformer(
            ComputedFieldRegistry::new()
                .with("User", full_name())
                .with("Post", title),
        );
        let filter = node(json!({
            "OR": [{
                "posts_some": {
                    "AND": [{ "titleComputed": "rust" }, { "author": { "fullName": "Jane Doe" } }]
                }
            }]
        }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(
            out.into_json(),
            json!({
                "OR": [{
                    "posts_some": {
                        "AND": [
                            { "title_contains": "rust" },
                            { "author": { "firstName": "Jane", "lastName": "Doe" } }
                        ]
                    }
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_null_nested_value_is_left_alone() {
        let transformer = transformer(ComputedFieldRegistry::new().with("User", full_name()));
        let filter = node(json!({ "posts_some": null, "AND": [null] }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(out.into_json(), json!({ "posts_some": null, "AND": [null] }));
    }

    #[tokio::test]
    async fn test_mixed_combinator_branches_are_still_rewritten() {
        let transformer = transformer(ComputedFieldRegistry::new().with("User", full_name()));
        let filter = node(json!({ "AND": [{ "fullName": "Jane Doe" }, true, null] }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(
            out.into_json(),
            json!({ "AND": [{ "firstName": "Jane", "lastName": "Doe" }, true, null] })
        );
    }

    #[tokio::test]
    async fn test_null_computed_value_is_still_transformed() {
        let registry = ComputedFieldRegistry::new().with(
            "User",
            ComputedFieldMap::new().with_fn("fullName", |value| {
                assert_eq!(value, FieldValue::Scalar(Value::Null));
                let mut out = FieldMap::new();
                out.insert("lastName".into(), value);
                Ok(out)
            }),
        );
        let transformer = transformer(registry);
        let filter = node(json!({ "fullName": null, "age_gt": 2 }));

        let out = run(&transformer, &filter, "UserWhereInput").await.unwrap();

        assert_eq!(out.into_json(), json!({ "age_gt": 2, "lastName": null }));
    }

    #[tokio::test]
    async fn test_transformation_error_propagates() {
        let registry = ComputedFieldRegistry::new().with(
            "Post",
            ComputedFieldMap::new().with_fn("titleComputed", |_| Err("lookup failed".into())),
        );
        let transformer = transformer(registry);
        let filter = node(json!({ "posts_some": { "titleComputed": "x" } }));

        let err = run(&transformer, &filter, "UserWhereInput").await.unwrap_err();

        assert!(err.is_transformation());
        assert!(matches!(err, TransformError::Transformation { ref field, .. } if field == "titleComputed"));
    }

    #[tokio::test]
    async fn test_unknown_where_input_is_a_schema_error() {
        let transformer = transformer(ComputedFieldRegistry::new());
        let filter = node(json!({ "title": "x" }));

        let err = run(&transformer, &filter, "CommentWhereInput").await.unwrap_err();

        assert!(err.is_schema_lookup());
    }

    #[tokio::test]
    async fn test_context_reaches_transformations() {
        let index = Arc::new(IntrospectionIndex::from_sdl(SCHEMA).unwrap());
        let registry: ComputedFieldRegistry<String> = ComputedFieldRegistry::new().with(
            "Post",
            ComputedFieldMap::new().with(
                "mine",
                ContextFnTransform(|_value: FieldValue, viewer: &String| {
                    let mut author = FieldMap::new();
                    author.insert("firstName".into(), viewer.clone().into());
                    let mut out = FieldMap::new();
                    out.insert("author".into(), FilterNode::from(author).into());
                    Ok::<_, BoxError>(out)
                }),
            ),
        );
        let transformer = WhereTransformer::new(index, Arc::new(registry));
        let filter = node(json!({ "posts_some": { "mine": true } }));

        let out = transformer
            .transform_for_entity(&filter, "UserWhereInput", &"jane".to_string())
            .await
            .unwrap();

        assert_eq!(
            out.into_json(),
            json!({ "posts_some": { "author": { "firstName": "jane" } } })
        );
    }

    #[tokio::test]
    async fn test_transform_json() {
        let transformer = transformer(ComputedFieldRegistry::new().with("User", full_name()));

        let out = transformer
            .transform_json(&json!({ "fullName": "Jane Doe" }), "UserWhereInput", &())
            .await
            .unwrap();

        assert_eq!(out, json!({ "firstName": "Jane", "lastName": "Doe" }));
    }
}
