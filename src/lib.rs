pub mod config;
pub mod error;
pub mod filter;
pub mod introspection;
pub mod logging;
pub mod registry;
pub mod transformer;


pub use config::{LogConfig, LogFormat, SchemaFormat, TransformerConfig};
pub use error::{BoxError, TransformError, TransformResult};
pub use filter::{strip_list_modifier, FieldMap, FieldValue, FilterNode};
pub use introspection::{entity_type_name_from_where_input, IntrospectionIndex, TypeKind};
pub use registry::{
    registry_key, AsyncFnTransform, ComputedFieldMap, ComputedFieldRegistry,
    ComputedFieldTransform, ContextFnTransform, FnTransform, RegistryResolver,
    TransformationLookup,
};
pub use transformer::{TransformRequest, WhereTransformer};
