use std::collections::{HashMap, HashSet};

use graphql_parser::schema::{self as sdl, Definition, TypeDefinition};
use serde::Deserialize;

use crate::error::{TransformError, TransformResult};

pub const WHERE_INPUT_SUFFIX: &str = "WhereInput";

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub kind: TypeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    /// Innermost named type, unwrapping list and non-null wrappers.
    pub fn named_type(&self) -> Option<&str> {
        match (&self.name, &self.of_type) {
            (Some(name), _) => Some(name.as_str()),
            (None, Some(inner)) => inner.named_type(),
            (None, None) => None,
        }
    }

    pub fn is_input_object(&self) -> bool {
        self.kind == TypeKind::InputObject
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputValueDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub name: String,
    #[serde(default)]
    pub fields: Option<Vec<FieldDescriptor>>,
    #[serde(default)]
    pub input_fields: Option<Vec<InputValueDescriptor>>,
}

#[derive(Debug, Deserialize)]
struct SchemaTypes {
    types: Vec<TypeDescriptor>,
}

#[derive(Debug, Deserialize)]
struct SchemaEnvelope {
    #[serde(rename = "__schema")]
    schema: SchemaTypes,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    data: SchemaEnvelope,
}

// `{ data: { __schema } }`, `{ __schema }` or a bare `{ types }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IntrospectionDocument {
    Response(DataEnvelope),
    Schema(SchemaEnvelope),
    Types(SchemaTypes),
}

#[derive(Debug, Clone, Default)]
pub struct IntrospectionIndex {
    types: HashMap<String, TypeDescriptor>,
}

impl IntrospectionIndex {
    pub fn new(types: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        let types = types
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();
        Self { types }
    }

    pub fn from_introspection_json(json: &str) -> TransformResult<Self> {
        let document: IntrospectionDocument = serde_json::from_str(json)?;
        let types = match document {
            IntrospectionDocument::Response(envelope) => envelope.data.schema.types,
            IntrospectionDocument::Schema(envelope) => envelope.schema.types,
            IntrospectionDocument::Types(types) => types.types,
        };
        tracing::debug!(types = types.len(), "Loaded schema from introspection result");
        Ok(Self::new(types))
    }

    pub fn from_sdl(source: &str) -> TransformResult<Self> {
        let document = sdl::parse_schema::<String>(source)
            .map_err(|e| TransformError::InvalidSchema(e.to_string()))?;

        let definitions: Vec<&TypeDefinition<String>> = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::TypeDefinition(type_definition) => Some(type_definition),
                Definition::TypeExtension(_) => {
                    tracing::warn!("Ignoring type extension in schema document");
                    None
                }
                _ => None,
            })
            .collect();

        let mut kinds: HashMap<&str, TypeKind> = BUILTIN_SCALARS
            .iter()
            .map(|name| (*name, TypeKind::Scalar))
            .collect();
        for definition in &definitions {
            let (name, kind) = definition_kind(definition);
            kinds.insert(name, kind);
        }

        let mut types: Vec<TypeDescriptor> = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            types.push(describe_definition(definition, &kinds)?);
        }
        let declared: HashSet<String> = types.iter().map(|t| t.name.clone()).collect();
        for scalar in BUILTIN_SCALARS.iter().filter(|s| !declared.contains(**s)) {
            types.push(TypeDescriptor {
                kind: TypeKind::Scalar,
                name: scalar.to_string(),
                fields: None,
                input_fields: None,
            });
        }

        tracing::debug!(types = types.len(), "Loaded schema from SDL document");
        Ok(Self::new(types))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn type_descriptor(&self, type_name: &str) -> TransformResult<&TypeDescriptor> {
        self.types
            .get(type_name)
            .ok_or_else(|| TransformError::TypeNotFound(type_name.to_string()))
    }

    /// Input fields of a where input type that can hold a nested filter node.
    pub fn input_object_fields_of(
        &self,
        where_input_name: &str,
    ) -> TransformResult<Vec<&InputValueDescriptor>> {
        let descriptor = self.type_descriptor(where_input_name)?;
        Ok(descriptor
            .input_fields
            .iter()
            .flatten()
            .filter(|input_field| input_field.ty.is_input_object())
            .collect())
    }

    pub fn fields_of(&self, entity_type_name: &str) -> TransformResult<&[FieldDescriptor]> {
        let descriptor = self.type_descriptor(entity_type_name)?;
        Ok(descriptor.fields.as_deref().unwrap_or_default())
    }
}

/// `UserWhereInput` -> `User`.
pub fn entity_type_name_from_where_input(where_input_name: &str) -> TransformResult<&str> {
    where_input_name
        .strip_suffix(WHERE_INPUT_SUFFIX)
        .filter(|entity| !entity.is_empty())
        .ok_or_else(|| TransformError::NotAWhereInput(where_input_name.to_string()))
}

fn definition_kind<'a>(definition: &'a TypeDefinition<String>) -> (&'a str, TypeKind) {
    match definition {
        TypeDefinition::Scalar(t) => (t.name.as_str(), TypeKind::Scalar),
        TypeDefinition::Object(t) => (t.name.as_str(), TypeKind::Object),
        TypeDefinition::Interface(t) => (t.name.as_str(), TypeKind::Interface),
        TypeDefinition::Union(t) => (t.name.as_str(), TypeKind::Union),
        TypeDefinition::Enum(t) => (t.name.as_str(), TypeKind::Enum),
        TypeDefinition::InputObject(t) => (t.name.as_str(), TypeKind::InputObject),
    }
}

fn describe_definition(
    definition: &TypeDefinition<String>,
    kinds: &HashMap<&str, TypeKind>,
) -> TransformResult<TypeDescriptor> {
    let (name, kind) = definition_kind(definition);
    let mut descriptor = TypeDescriptor {
        kind,
        name: name.to_string(),
        fields: None,
        input_fields: None,
    };
    match definition {
        TypeDefinition::Object(object) => {
            descriptor.fields = Some(describe_fields(&object.fields, kinds)?);
        }
        TypeDefinition::Interface(interface) => {
            descriptor.fields = Some(describe_fields(&interface.fields, kinds)?);
        }
        TypeDefinition::InputObject(input) => {
            let input_fields = input
                .fields
                .iter()
                .map(|value| {
                    Ok(InputValueDescriptor {
                        name: value.name.clone(),
                        ty: type_ref(&value.value_type, kinds)?,
                    })
                })
                .collect::<TransformResult<Vec<_>>>()?;
            descriptor.input_fields = Some(input_fields);
        }
        _ => {}
    }
    Ok(descriptor)
}

fn describe_fields(
    fields: &[sdl::Field<String>],
    kinds: &HashMap<&str, TypeKind>,
) -> TransformResult<Vec<FieldDescriptor>> {
    fields
        .iter()
        .map(|field| {
            Ok(FieldDescriptor {
                name: field.name.clone(),
                ty: type_ref(&field.field_type, kinds)?,
            })
        })
        .collect()
}

fn type_ref(ty: &sdl::Type<String>, kinds: &HashMap<&str, TypeKind>) -> TransformResult<TypeRef> {
    match ty {
        sdl::Type::NamedType(name) => {
            let kind = kinds.get(name.as_str()).copied().ok_or_else(|| {
                TransformError::InvalidSchema(format!("unknown type `{}`", name))
            })?;
            Ok(TypeRef {
                kind,
                name: Some(name.clone()),
                of_type: None,
            })
        }
        sdl::Type::ListType(inner) => Ok(TypeRef {
            kind: TypeKind::List,
            name: None,
            of_type: Some(Box::new(type_ref(inner, kinds)?)),
        }),
        sdl::Type::NonNullType(inner) => Ok(TypeRef {
            kind: TypeKind::NonNull,
            name: None,
            of_type: Some(Box::new(type_ref(inner, kinds)?)),
        }),
    }
}
