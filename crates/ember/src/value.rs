use std::{
    cell::{OnceCell, RefCell},
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::{
    class::ClassInfo,
    exception::RunResult,
    function::{Arity, Function, NativeFunction, NativeImpl},
    run::Vm,
    scope::{Scope, ScopeKind},
    types::{generator::GeneratorState, hash::HashTable, iter::NativeIter},
};

/// Source of value identities. Ids are never reused within a process.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static NONE: Value = Value::alloc(Data::None);
    static TRUE: Value = Value::alloc(Data::Bool(true));
    static FALSE: Value = Value::alloc(Data::Bool(false));
}

/// Runtime type of a value, derived from its payload.
///
/// Every tag owns a slot table installed at VM bootstrap, see [`crate::types::TypeTables`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter, EnumCount)]
pub enum TypeTag {
    Int,
    Float,
    Bool,
    #[strum(serialize = "NoneType")]
    None,
    String,
    Bytes,
    Array,
    Tuple,
    Hash,
    Function,
    Type,
    Object,
    BuiltInFunction,
    Iterator,
    Generator,
}

/// Payload of a value.
pub(crate) enum Data {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Box<str>),
    Bytes(Box<[u8]>),
    Array(RefCell<Vec<Value>>),
    Tuple(Box<[Value]>),
    Hash(RefCell<HashTable>),
    Function(Function),
    Native(NativeFunction),
    /// A built-in type such as `Int` or `Array`.
    Type(TypeTag),
    /// A user class or built-in error class.
    Class(ClassInfo),
    /// An instance; holds its class. Attributes live in the value's scope.
    Object(Value),
    Iterator(RefCell<NativeIter>),
    Generator(GeneratorState),
}

struct ValueInner {
    id: u64,
    data: Data,
    attrs: OnceCell<Scope>,
}

/// A dynamically typed script value.
///
/// Cloning is cheap and produces an alias: both handles share identity, payload and
/// attributes. Reference cycles are not collected.
#[derive(Clone)]
pub struct Value(Rc<ValueInner>);

impl Value {
    fn alloc(data: Data) -> Self {
        Self(Rc::new(ValueInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            data,
            attrs: OnceCell::new(),
        }))
    }

    #[must_use]
    pub fn none() -> Self {
        NONE.with(Clone::clone)
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        if value {
            TRUE.with(Clone::clone)
        } else {
            FALSE.with(Clone::clone)
        }
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::alloc(Data::Int(value))
    }

    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::alloc(Data::Float(value))
    }

    #[must_use]
    pub fn string(value: impl Into<Box<str>>) -> Self {
        Self::alloc(Data::Str(value.into()))
    }

    #[must_use]
    pub fn bytes(value: impl Into<Box<[u8]>>) -> Self {
        Self::alloc(Data::Bytes(value.into()))
    }

    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::alloc(Data::Array(RefCell::new(items)))
    }

    #[must_use]
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::alloc(Data::Tuple(items.into_boxed_slice()))
    }

    pub(crate) fn hash(table: HashTable) -> Self {
        Self::alloc(Data::Hash(RefCell::new(table)))
    }

    pub(crate) fn function(function: Function) -> Self {
        Self::alloc(Data::Function(function))
    }

    /// Wraps a host closure as a callable script value.
    ///
    /// The closure receives the VM, so it can call back into script values with
    /// [`Vm::call_value`] or raise script errors.
    pub fn native(
        name: &str,
        arity: Arity,
        func: impl Fn(&mut Vm, &[Value]) -> RunResult<Value> + 'static,
    ) -> Self {
        Self::from_native(NativeFunction::new(name, arity, NativeImpl::Host(Rc::new(func))))
    }

    pub(crate) fn from_native(native: NativeFunction) -> Self {
        Self::alloc(Data::Native(native))
    }

    pub(crate) fn type_value(tag: TypeTag) -> Self {
        Self::alloc(Data::Type(tag))
    }

    pub(crate) fn class(info: ClassInfo) -> Self {
        Self::alloc(Data::Class(info))
    }

    /// An instance of `class` whose attributes live in `scope`.
    pub(crate) fn object(class: Value, scope: Scope) -> Self {
        let value = Self::alloc(Data::Object(class));
        let _ = value.0.attrs.set(scope);
        value
    }

    pub(crate) fn iterator(iter: NativeIter) -> Self {
        Self::alloc(Data::Iterator(RefCell::new(iter)))
    }

    pub(crate) fn generator(state: GeneratorState) -> Self {
        Self::alloc(Data::Generator(state))
    }

    pub(crate) fn data(&self) -> &Data {
        &self.0.data
    }

    /// Process-wide identity of this value.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Identity comparison, the semantics of `is`.
    #[must_use]
    pub fn is(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self.data() {
            Data::None => TypeTag::None,
            Data::Bool(_) => TypeTag::Bool,
            Data::Int(_) => TypeTag::Int,
            Data::Float(_) => TypeTag::Float,
            Data::Str(_) => TypeTag::String,
            Data::Bytes(_) => TypeTag::Bytes,
            Data::Array(_) => TypeTag::Array,
            Data::Tuple(_) => TypeTag::Tuple,
            Data::Hash(_) => TypeTag::Hash,
            Data::Function(_) => TypeTag::Function,
            Data::Native(_) => TypeTag::BuiltInFunction,
            Data::Type(_) | Data::Class(_) => TypeTag::Type,
            Data::Object(_) => TypeTag::Object,
            Data::Iterator(_) => TypeTag::Iterator,
            Data::Generator(_) => TypeTag::Generator,
        }
    }

    /// The user-facing type name: the class name for objects, the tag otherwise.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self.data() {
            Data::Object(class) => class.class_name().unwrap_or("Object").to_owned(),
            _ => self.type_tag().to_string(),
        }
    }

    /// Name of a class or built-in type value.
    #[must_use]
    pub(crate) fn class_name(&self) -> Option<&str> {
        match self.data() {
            Data::Class(info) => Some(info.name()),
            Data::Type(tag) => Some(tag.into()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self.data(), Data::None)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.data() {
            Data::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload. Bools are not ints here, see [`crate::types::number::Num`].
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self.data() {
            Data::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self.data() {
            Data::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self.data() {
            Data::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.data() {
            Data::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Snapshot of the elements of an array or tuple.
    #[must_use]
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        match self.data() {
            Data::Array(items) => Some(items.borrow().clone()),
            Data::Tuple(items) => Some(items.to_vec()),
            _ => None,
        }
    }

    pub(crate) fn as_array(&self) -> Option<&RefCell<Vec<Value>>> {
        match self.data() {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn as_tuple(&self) -> Option<&[Value]> {
        match self.data() {
            Data::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn as_hash(&self) -> Option<&RefCell<HashTable>> {
        match self.data() {
            Data::Hash(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn as_function(&self) -> Option<&Function> {
        match self.data() {
            Data::Function(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn as_native(&self) -> Option<&NativeFunction> {
        match self.data() {
            Data::Native(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn as_class(&self) -> Option<&ClassInfo> {
        match self.data() {
            Data::Class(info) => Some(info),
            _ => None,
        }
    }

    pub(crate) fn as_type(&self) -> Option<TypeTag> {
        match self.data() {
            Data::Type(tag) => Some(*tag),
            _ => None,
        }
    }

    /// The class of an object instance.
    pub(crate) fn object_class(&self) -> Option<&Value> {
        match self.data() {
            Data::Object(class) => Some(class),
            _ => None,
        }
    }

    pub(crate) fn as_iterator(&self) -> Option<&RefCell<NativeIter>> {
        match self.data() {
            Data::Iterator(iter) => Some(iter),
            _ => None,
        }
    }

    pub(crate) fn as_generator(&self) -> Option<&GeneratorState> {
        match self.data() {
            Data::Generator(state) => Some(state),
            _ => None,
        }
    }

    /// The value's own attribute table, if one has been allocated.
    pub(crate) fn attrs(&self) -> Option<&Scope> {
        self.0.attrs.get()
    }

    /// Own attribute lookup, without consulting the per-type slot tables.
    #[must_use]
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.attrs().and_then(|scope| scope.get_local(name))
    }

    /// Binds an attribute in the value's own table, allocating it on first use.
    pub fn set_attr(&self, name: &str, value: Value) {
        self.0
            .attrs
            .get_or_init(|| Scope::new(ScopeKind::Object, None))
            .set(name, value);
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            Data::None => f.write_str("None"),
            Data::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Data::Int(i) => write!(f, "{i}"),
            Data::Float(v) => write!(f, "{v:?}"),
            Data::Str(s) => write!(f, "{s:?}"),
            Data::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Data::Array(items) => match items.try_borrow() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => f.write_str("[...]"),
            },
            Data::Tuple(items) => f.debug_tuple("").field(&items).finish(),
            _ => write!(f, "<{} #{}>", self.type_name(), self.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_share_identity() {
        assert!(Value::none().is(&Value::none()));
        assert!(Value::bool(true).is(&Value::bool(true)));
        assert!(!Value::bool(true).is(&Value::bool(false)));
        assert!(!Value::int(1).is(&Value::int(1)));
    }

    #[test]
    fn ids_are_monotonic() {
        let a = Value::int(1);
        let b = Value::int(1);
        assert!(b.id() > a.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn aliases_see_mutation() {
        let a = Value::array(vec![Value::int(1)]);
        let b = a.clone();
        b.as_array().unwrap().borrow_mut().push(Value::int(2));
        assert_eq!(a.to_vec().unwrap().len(), 2);
    }

    #[test]
    fn attributes_are_lazy() {
        let v = Value::string("x");
        assert!(v.attrs().is_none());
        v.set_attr("tag", Value::int(3));
        assert_eq!(v.get_own("tag").and_then(|t| t.as_int()), Some(3));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::none().type_name(), "NoneType");
        assert_eq!(Value::float(1.5).type_tag(), TypeTag::Float);
        assert_eq!(Value::tuple(vec![]).type_name(), "Tuple");
    }
}
