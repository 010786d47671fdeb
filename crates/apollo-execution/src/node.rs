use crate::value::DeferredValue;
use crate::value::FieldValue;
use crate::JsonMap;
use crate::JsonValue;
use crate::ResponseDataPathSegment;
use apollo_compiler::executable::Field;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::schema::Type;
use apollo_compiler::Name;

/// Return in `Err` when a null was produced at some non-nullable place
///
/// <https://spec.graphql.org/October2021/#sec-Handling-Field-Errors>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PropagateNull;

/// Index of a node in its [`NodeTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(usize);

/// Arena of execution nodes, one per response position.
///
/// Nodes own their children through id lists
/// and refer to their parent by id, for path computation only.
pub(crate) struct NodeTree<'a> {
    nodes: Vec<ExecutionNode<'a>>,
}

pub(crate) struct ExecutionNode<'a> {
    /// `None` only for the root
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind<'a>,
    /// Declared type of this position. For list items, the item type of the parent list.
    pub(crate) ty: Type,
    /// Same-response-key field selections, merged. Empty for the root.
    pub(crate) fields: Vec<&'a Field>,
    /// Set for list items
    pub(crate) index: Option<usize>,
    pub(crate) origin: NodeOrigin,
    pub(crate) result: NodeResult,
}

pub(crate) enum NodeKind<'a> {
    /// Anchors the tree, carries the top-level selection set
    Root {
        object_type: &'a ObjectType,
        sub_fields: Vec<NodeId>,
    },
    /// Object, interface or union position.
    /// `object_type` is the concrete type, known once the node is completed.
    Object {
        object_type: Option<&'a ObjectType>,
        sub_fields: Vec<NodeId>,
    },
    Array {
        items: Vec<NodeId>,
    },
    /// Scalar or enum position
    Value,
    /// Pinned to null, never resolved
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeOrigin {
    /// Produced by a resolver (or the default resolver)
    Field,
    /// Element of the value of its parent list
    ListItem,
    /// Pinned to a subscription event payload
    SubscriptionEvent,
}

pub(crate) enum NodeResult {
    /// Not started
    Unresolved,
    /// Started, in flight
    Pending,
    /// Waiting for the next batch of deferred values
    Deferred(Box<dyn DeferredValue>),
    /// Completed. For object and list positions this is the source value
    /// of child nodes, for leaf positions the coerced value.
    Resolved(FieldValue),
    /// Completed to null after an error was recorded
    Failed,
}

impl NodeId {
    pub(crate) const ROOT: Self = Self(0);
}

impl<'a> NodeTree<'a> {
    pub(crate) fn new(root_type: &'a ObjectType, root_value: FieldValue) -> Self {
        let root = ExecutionNode {
            parent: None,
            kind: NodeKind::Root {
                object_type: root_type,
                sub_fields: Vec::new(),
            },
            ty: Type::NonNullNamed(root_type.name.clone()),
            fields: Vec::new(),
            index: None,
            origin: NodeOrigin::Field,
            result: NodeResult::Resolved(root_value),
        };
        Self { nodes: vec![root] }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn get(&self, id: NodeId) -> &ExecutionNode<'a> {
        &self.nodes[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut ExecutionNode<'a> {
        &mut self.nodes[id.0]
    }

    /// Adds a node as the last child of its parent
    pub(crate) fn add_child(&mut self, node: ExecutionNode<'a>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = node.parent;
        self.nodes.push(node);
        if let Some(parent) = parent {
            match &mut self.get_mut(parent).kind {
                NodeKind::Root { sub_fields, .. } | NodeKind::Object { sub_fields, .. } => {
                    sub_fields.push(id)
                }
                NodeKind::Array { items } => items.push(id),
                NodeKind::Value | NodeKind::Null => {}
            }
        }
        id
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.get(id).kind {
            NodeKind::Root { sub_fields, .. } | NodeKind::Object { sub_fields, .. } => sub_fields,
            NodeKind::Array { items } => items,
            NodeKind::Value | NodeKind::Null => &[],
        }
    }

    pub(crate) fn apply_to_children(&self, id: NodeId, reverse: bool, mut f: impl FnMut(NodeId)) {
        let children = self.children(id);
        if reverse {
            children.iter().rev().copied().for_each(&mut f)
        } else {
            children.iter().copied().for_each(&mut f)
        }
    }

    /// The concrete object type of an object position, once completed
    pub(crate) fn object_type(&self, id: NodeId) -> Option<&'a ObjectType> {
        match self.get(id).kind {
            NodeKind::Root { object_type, .. } => Some(object_type),
            NodeKind::Object { object_type, .. } => object_type,
            _ => None,
        }
    }

    /// The value that resolvers of this node see as their parent object
    pub(crate) fn source(&self, id: NodeId) -> Option<&FieldValue> {
        let parent = self.get(id).parent?;
        match &self.get(parent).result {
            NodeResult::Resolved(value) => Some(value),
            _ => None,
        }
    }

    /// Response path of this node, from the root.
    ///
    /// Walks parent links, building the path leaf to root then reversing it.
    pub(crate) fn path(&self, id: NodeId) -> Vec<ResponseDataPathSegment> {
        let mut path = Vec::new();
        let mut next = Some(id);
        while let Some(id) = next {
            let node = self.get(id);
            if let Some(index) = node.index {
                path.push(ResponseDataPathSegment::ListIndex(index))
            } else if let Some(key) = node.response_key() {
                path.push(ResponseDataPathSegment::Field(key.clone()))
            }
            next = node.parent;
        }
        path.reverse();
        path
    }

    /// Materializes the response value of a subtree.
    ///
    /// Returns `Err` if the value is null at a non-null position:
    /// the nearest nullable ancestor then becomes null.
    /// Nodes that did not complete (for example after cancellation) are null.
    pub(crate) fn to_value(&self, id: NodeId) -> Result<JsonValue, PropagateNull> {
        let node = self.get(id);
        let value = match (&node.kind, &node.result) {
            (NodeKind::Root { sub_fields, .. }, _) => self.object_value(sub_fields),
            (_, NodeResult::Resolved(value)) if value.is_null() => JsonValue::Null,
            (NodeKind::Object { sub_fields, .. }, NodeResult::Resolved(_)) => {
                self.object_value(sub_fields)
            }
            (NodeKind::Array { items }, NodeResult::Resolved(_)) => {
                match items.iter().map(|&item| self.to_value(item)).collect() {
                    Ok(items) => JsonValue::Array(items),
                    Err(PropagateNull) => JsonValue::Null,
                }
            }
            (NodeKind::Value, NodeResult::Resolved(FieldValue::Json(json))) => json.clone(),
            _ => JsonValue::Null,
        };
        if value.is_null() && node.ty.is_non_null() {
            Err(PropagateNull)
        } else {
            Ok(value)
        }
    }

    /// Response `data`, or `None` if a null propagated all the way to the root
    pub(crate) fn to_data(&self) -> Option<JsonMap> {
        match self.to_value(NodeId::ROOT) {
            Ok(JsonValue::Object(map)) => Some(map),
            _ => None,
        }
    }

    fn object_value(&self, sub_fields: &[NodeId]) -> JsonValue {
        let mut map = JsonMap::with_capacity(sub_fields.len());
        for &child in sub_fields {
            let Some(key) = self.get(child).response_key() else {
                continue;
            };
            match self.to_value(child) {
                Ok(value) => {
                    map.insert(key.as_str(), value);
                }
                Err(PropagateNull) => return JsonValue::Null,
            }
        }
        JsonValue::Object(map)
    }
}

impl<'a> ExecutionNode<'a> {
    pub(crate) fn new(
        parent: NodeId,
        kind: NodeKind<'a>,
        ty: Type,
        fields: Vec<&'a Field>,
        index: Option<usize>,
        origin: NodeOrigin,
    ) -> Self {
        Self {
            parent: Some(parent),
            kind,
            ty,
            fields,
            index,
            origin,
            result: NodeResult::Unresolved,
        }
    }

    /// Alias or field name
    pub(crate) fn response_key(&self) -> Option<&'a Name> {
        self.fields.first().map(|field| field.response_key())
    }

    pub(crate) fn field_name(&self) -> &'a str {
        self.fields.first().map_or("", |field| field.name.as_str())
    }

    pub(crate) fn location(&self) -> Option<SourceSpan> {
        self.fields.first().and_then(|field| field.name.location())
    }

    /// Whether this node still needs a resolver call.
    /// List items and subscription event nodes get their value from elsewhere.
    pub(crate) fn is_unresolved(&self) -> bool {
        self.origin == NodeOrigin::Field && matches!(self.result, NodeResult::Unresolved)
    }
}
