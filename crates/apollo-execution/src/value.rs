use crate::error::FieldError;
use crate::JsonValue;
use apollo_compiler::Name;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A value produced by a resolver, and the source value passed to resolvers of its sub-fields.
#[derive(Clone)]
pub enum FieldValue {
    /// * JSON null represents GraphQL null
    /// * A GraphQL enum value is represented as a JSON string
    /// * Built-in scalars are coerced according to their respective *Result Coercion* spec
    /// * For custom scalars, any JSON value is passed through as-is
    /// * Where the GraphQL type is an object, a JSON object is a valid source:
    ///   fields without a registered resolver read the same-named key.
    /// * Where the GraphQL type is a list, a JSON array is a valid value.
    Json(JsonValue),

    /// An opaque host value, expected where the GraphQL type is an object, interface, or union
    Object(ObjectRef),

    /// Expected for GraphQL list types
    List(Vec<FieldValue>),
}

/// A reference-counted host value, optionally tagged with its concrete GraphQL object type.
///
/// The type name is consulted when the schema indicates an abstract (interface or union) type.
#[derive(Clone)]
pub struct ObjectRef {
    type_name: Option<Name>,
    value: Arc<dyn Any + Send + Sync>,
}

/// The outcome of calling a resolver.
pub enum Resolved {
    /// The value is available immediately.
    Ready(FieldValue),

    /// The value will be available when this future completes.
    ///
    /// Other fields may be scheduled while it is pending.
    Pending(BoxFuture<'static, Result<Resolved, FieldError>>),

    /// The value is not fetched yet and should be fetched together with sibling requests.
    ///
    /// [`DeferredValue::complete`] is only called once no other field can make progress.
    Deferred(Box<dyn DeferredValue>),
}

/// A placeholder for a value that is completed in batches.
pub trait DeferredValue: Send + 'static {
    /// Fetches the real value.
    ///
    /// The result may itself be deferred again, in which case it waits for the next batch.
    fn complete(
        self: Box<Self>,
        cancellation: CancellationToken,
    ) -> BoxFuture<'static, Result<Resolved, FieldError>>;
}

impl FieldValue {
    /// Construct a null value
    pub fn null() -> Self {
        Self::Json(JsonValue::Null)
    }

    /// Construct a value from something that is convertible to JSON
    pub fn json(json: impl Into<JsonValue>) -> Self {
        Self::Json(json.into())
    }

    /// Construct a host object value without a type name
    pub fn object(value: impl Any + Send + Sync) -> Self {
        Self::Object(ObjectRef {
            type_name: None,
            value: Arc::new(value),
        })
    }

    /// Construct a host object value of the given concrete object type
    pub fn typed_object(type_name: Name, value: impl Any + Send + Sync) -> Self {
        Self::Object(ObjectRef {
            type_name: Some(type_name),
            value: Arc::new(value),
        })
    }

    /// Construct a list value from an iterator
    pub fn list<I>(iter: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        Self::List(iter.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(JsonValue::Null))
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(json) => Some(json),
            _ => None,
        }
    }

    /// Returns the host value if this is an object of type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Object(object) => object.downcast_ref(),
            _ => None,
        }
    }

    /// The name of the concrete object type carried by this value, if any:
    /// the [`ObjectRef`] type name or a JSON `"__typename"` key.
    pub(crate) fn type_name_hint(&self) -> Option<&str> {
        match self {
            Self::Object(object) => object.type_name(),
            Self::Json(JsonValue::Object(map)) => map.get("__typename")?.as_str(),
            _ => None,
        }
    }
}

impl ObjectRef {
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl Resolved {
    /// Construct a ready value from something that is convertible to a [`FieldValue`]
    pub fn value(value: impl Into<FieldValue>) -> Self {
        Self::Ready(value.into())
    }

    /// Construct a ready null value
    pub fn null() -> Self {
        Self::Ready(FieldValue::null())
    }

    /// Construct a pending value from a future
    pub fn future<F, T>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<T, FieldError>> + Send + 'static,
        T: Into<FieldValue>,
    {
        Self::Pending(Box::pin(async move { future.await.map(Resolved::value) }))
    }

    /// Construct a deferred value
    pub fn deferred(value: impl DeferredValue) -> Self {
        Self::Deferred(Box::new(value))
    }
}

macro_rules! impl_from_json {
    ($($ty: ty),+) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::Json(value.into())
                }
            }
        )+
    };
}

impl_from_json!(JsonValue, &str, String, bool, i32, i64, u32, u64, f64);

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        Self::list(items)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Into::into)
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(json) => json.fmt(f),
            Self::Object(object) => object.fmt(f),
            Self::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending"),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::name;

    #[test]
    fn type_name_hint() {
        let json = FieldValue::json(serde_json_bytes::json!({"__typename": "Droid"}));
        assert_eq!(json.type_name_hint(), Some("Droid"));

        let typed = FieldValue::typed_object(name!("Human"), 42_u32);
        assert_eq!(typed.type_name_hint(), Some("Human"));
        assert_eq!(typed.downcast_ref::<u32>(), Some(&42));
        assert_eq!(typed.downcast_ref::<i64>(), None);

        assert_eq!(FieldValue::object(()).type_name_hint(), None);
        assert_eq!(FieldValue::json("Human").type_name_hint(), None);
    }

    #[test]
    fn list_from_iterator() {
        let list = FieldValue::list([1, 2, 3]);
        let FieldValue::List(items) = list else {
            panic!("expected a list")
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].as_json(), Some(&JsonValue::from(3)));
    }
}
