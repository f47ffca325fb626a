//! Type system: interned type descriptors and the type registry.
//!
//! Every type the compiler knows about is an interned [`ObjectType`] owned by
//! the global registry; code holds [`PyType`] handles and compares by id.
//! Built-in ids occupy a small, stable namespace shared with the runtime (it
//! appears in IR metadata and runtime APIs):
//!
//! - 0..=11: none, int, double, bool, string, list, dict, tuple, set,
//!   function, module, class
//! - 50: any
//! - 100..: parameterised `list[T]` ids (`LIST_BASE + component id`)
//! - 200..: parameterised `dict[K, V]` ids (`DICT_BASE + key component id`)
//! - 400..: opaque pointer ids (internal)

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

pub const TYPE_NONE: u32 = 0;
pub const TYPE_INT: u32 = 1;
pub const TYPE_DOUBLE: u32 = 2;
pub const TYPE_BOOL: u32 = 3;
pub const TYPE_STRING: u32 = 4;
pub const TYPE_LIST: u32 = 5;
pub const TYPE_DICT: u32 = 6;
pub const TYPE_TUPLE: u32 = 7;
pub const TYPE_SET: u32 = 8;
pub const TYPE_FUNCTION: u32 = 9;
pub const TYPE_MODULE: u32 = 10;
pub const TYPE_CLASS: u32 = 11;
pub const TYPE_ANY: u32 = 50;

pub const LIST_BASE: u32 = 100;
pub const DICT_BASE: u32 = 200;
pub const PTR_BASE: u32 = 400;

/// Collapse a parameterised id to its container base id. Ids outside the
/// parameterised bands map to themselves.
pub fn base_type_id(id: u32) -> u32 {
    if id >= PTR_BASE {
        id
    } else if id >= DICT_BASE {
        TYPE_DICT
    } else if id >= LIST_BASE {
        TYPE_LIST
    } else {
        id
    }
}

/// Broad classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Primitive,
    Container,
    Function,
    Any,
}

/// An interned type descriptor. Instances are owned by the registry and
/// shared by id; equality is id equality.
#[derive(Debug)]
pub struct ObjectType {
    id: u32,
    name: String,
    category: TypeCategory,
    features: &'static [&'static str],
    /// Component type ids for parameterised containers
    /// (`[elem]` for lists, `[key, value]` for dicts)
    params: Vec<u32>,
}

impl ObjectType {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&feature)
    }

    pub fn params(&self) -> &[u32] {
        &self.params
    }
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectType {}

const FEATURES_NONE: &[&str] = &[];
const FEATURES_NUMERIC: &[&str] = &["numeric"];
const FEATURES_STRING: &[&str] = &["reference", "sequence", "iterable"];
const FEATURES_LIST: &[&str] = &["reference", "container", "sequence", "iterable"];
const FEATURES_DICT: &[&str] = &["reference", "container", "iterable"];
const FEATURES_REF: &[&str] = &["reference"];

/// The global type registry. Built-ins are installed at first use;
/// parameterised container types are interned on demand (idempotently, so
/// repeated lookups return the same descriptor).
pub struct TypeRegistry {
    by_id: Mutex<HashMap<u32, Arc<ObjectType>>>,
    by_name: Mutex<HashMap<String, u32>>,
}

static REGISTRY: LazyLock<TypeRegistry> = LazyLock::new(|| {
    let reg = TypeRegistry {
        by_id: Mutex::new(HashMap::new()),
        by_name: Mutex::new(HashMap::new()),
    };
    use TypeCategory::*;
    reg.install(TYPE_NONE, "None", Primitive, FEATURES_NONE, vec![]);
    reg.install(TYPE_INT, "int", Primitive, FEATURES_NUMERIC, vec![]);
    reg.install(TYPE_DOUBLE, "double", Primitive, FEATURES_NUMERIC, vec![]);
    reg.install(TYPE_BOOL, "bool", Primitive, FEATURES_NONE, vec![]);
    reg.install(TYPE_STRING, "string", Primitive, FEATURES_STRING, vec![]);
    reg.install(TYPE_LIST, "list", Container, FEATURES_LIST, vec![]);
    reg.install(TYPE_DICT, "dict", Container, FEATURES_DICT, vec![]);
    reg.install(TYPE_TUPLE, "tuple", Container, FEATURES_LIST, vec![]);
    reg.install(TYPE_SET, "set", Container, FEATURES_DICT, vec![]);
    reg.install(TYPE_FUNCTION, "function", Function, FEATURES_REF, vec![]);
    reg.install(TYPE_MODULE, "module", Primitive, FEATURES_REF, vec![]);
    reg.install(TYPE_CLASS, "class", Primitive, FEATURES_REF, vec![]);
    reg.install(TYPE_ANY, "any", Any, FEATURES_REF, vec![]);
    reg
});

/// Access the global registry.
pub fn registry() -> &'static TypeRegistry {
    &REGISTRY
}

impl TypeRegistry {
    fn install(
        &self,
        id: u32,
        name: &str,
        category: TypeCategory,
        features: &'static [&'static str],
        params: Vec<u32>,
    ) -> Arc<ObjectType> {
        let ty = Arc::new(ObjectType {
            id,
            name: name.to_string(),
            category,
            features,
            params,
        });
        self.by_id.lock().unwrap().insert(id, Arc::clone(&ty));
        self.by_name.lock().unwrap().insert(name.to_string(), id);
        ty
    }

    pub fn lookup_by_id(&self, id: u32) -> Option<Arc<ObjectType>> {
        self.by_id.lock().unwrap().get(&id).cloned()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<ObjectType>> {
        let id = *self.by_name.lock().unwrap().get(name)?;
        self.lookup_by_id(id)
    }

    /// Parameterised ids add the component's own id, clamped to `any` for
    /// components that are themselves parameterised, so nested containers
    /// never spill into the next id band.
    fn component_contribution(component: u32) -> u32 {
        if component >= LIST_BASE {
            TYPE_ANY
        } else {
            component
        }
    }

    /// The canonical `list[T]` descriptor, interned by component id.
    pub fn list_type(&self, element: &PyType) -> PyType {
        let id = LIST_BASE + Self::component_contribution(element.id());
        if let Some(existing) = self.lookup_by_id(id) {
            return PyType { inner: existing };
        }
        let ty = self.install(
            id,
            &format!("list[{}]", element.name()),
            TypeCategory::Container,
            FEATURES_LIST,
            vec![element.id()],
        );
        PyType { inner: ty }
    }

    /// The canonical `dict[K, V]` descriptor, interned by key id.
    pub fn dict_type(&self, key: &PyType, value: &PyType) -> PyType {
        let id = DICT_BASE + Self::component_contribution(key.id());
        if let Some(existing) = self.lookup_by_id(id) {
            return PyType { inner: existing };
        }
        let ty = self.install(
            id,
            &format!("dict[{}, {}]", key.name(), value.name()),
            TypeCategory::Container,
            FEATURES_DICT,
            vec![key.id(), value.id()],
        );
        PyType { inner: ty }
    }
}

/// A cheap, clonable handle to an interned [`ObjectType`].
#[derive(Clone)]
pub struct PyType {
    inner: Arc<ObjectType>,
}

impl PyType {
    /// Handle for a built-in id. Unknown ids resolve to `any`.
    pub fn of(id: u32) -> PyType {
        let inner = registry()
            .lookup_by_id(id)
            .or_else(|| registry().lookup_by_id(TYPE_ANY))
            .expect("registry always contains 'any'");
        PyType { inner }
    }

    pub fn none() -> PyType {
        Self::of(TYPE_NONE)
    }

    pub fn int() -> PyType {
        Self::of(TYPE_INT)
    }

    pub fn double() -> PyType {
        Self::of(TYPE_DOUBLE)
    }

    pub fn bool() -> PyType {
        Self::of(TYPE_BOOL)
    }

    pub fn string() -> PyType {
        Self::of(TYPE_STRING)
    }

    pub fn list() -> PyType {
        Self::of(TYPE_LIST)
    }

    pub fn dict() -> PyType {
        Self::of(TYPE_DICT)
    }

    pub fn any() -> PyType {
        Self::of(TYPE_ANY)
    }

    pub fn list_of(element: &PyType) -> PyType {
        registry().list_type(element)
    }

    pub fn dict_of(key: &PyType, value: &PyType) -> PyType {
        registry().dict_type(key, value)
    }

    /// Parse a type annotation. Grammar: an identifier, `list[T]` or
    /// `dict[K, V]` (recursively). Unknown names resolve to `any`.
    pub fn from_annotation(annotation: &str) -> PyType {
        let s = annotation.trim();
        if let Some(open) = s.find('[') {
            if s.ends_with(']') {
                let head = s[..open].trim();
                let inner = &s[open + 1..s.len() - 1];
                match head {
                    "list" => {
                        return PyType::list_of(&PyType::from_annotation(inner));
                    }
                    "dict" => {
                        if let Some((key, value)) = split_top_level_comma(inner) {
                            return PyType::dict_of(
                                &PyType::from_annotation(key),
                                &PyType::from_annotation(value),
                            );
                        }
                        return PyType::dict();
                    }
                    _ => return PyType::any(),
                }
            }
            return PyType::any();
        }
        match s {
            "int" => PyType::int(),
            "float" | "double" => PyType::double(),
            "bool" => PyType::bool(),
            "str" | "string" => PyType::string(),
            "None" | "none" => PyType::none(),
            "list" => PyType::list(),
            "dict" => PyType::dict(),
            "any" => PyType::any(),
            _ => PyType::any(),
        }
    }

    pub fn id(&self) -> u32 {
        self.inner.id()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn category(&self) -> TypeCategory {
        self.inner.category()
    }

    pub fn base_id(&self) -> u32 {
        base_type_id(self.id())
    }

    pub fn equals(&self, other: &PyType) -> bool {
        self.id() == other.id()
    }

    pub fn is_none(&self) -> bool {
        self.id() == TYPE_NONE
    }

    pub fn is_int(&self) -> bool {
        self.id() == TYPE_INT
    }

    pub fn is_double(&self) -> bool {
        self.id() == TYPE_DOUBLE
    }

    pub fn is_bool(&self) -> bool {
        self.id() == TYPE_BOOL
    }

    pub fn is_string(&self) -> bool {
        self.id() == TYPE_STRING
    }

    pub fn is_list(&self) -> bool {
        self.base_id() == TYPE_LIST
    }

    pub fn is_dict(&self) -> bool {
        self.base_id() == TYPE_DICT
    }

    pub fn is_any(&self) -> bool {
        self.id() == TYPE_ANY
    }

    /// Reference values live as pointers managed by the runtime.
    pub fn is_reference(&self) -> bool {
        self.inner.has_feature("reference")
    }

    pub fn is_container(&self) -> bool {
        self.inner.has_feature("container")
    }

    pub fn is_sequence(&self) -> bool {
        self.inner.has_feature("sequence")
    }

    pub fn is_numeric(&self) -> bool {
        self.inner.has_feature("numeric")
    }

    pub fn is_iterable(&self) -> bool {
        self.inner.has_feature("iterable")
    }

    /// Element type of a parameterised list (or `any` for the bare base).
    pub fn element_type(&self) -> PyType {
        if self.is_list() {
            if let Some(&elem) = self.inner.params().first() {
                return PyType::of(elem);
            }
        }
        PyType::any()
    }

    /// Key type of a parameterised dict (or `any` for the bare base).
    pub fn key_type(&self) -> PyType {
        if self.is_dict() {
            if let Some(&key) = self.inner.params().first() {
                return PyType::of(key);
            }
        }
        PyType::any()
    }

    /// Value type of a parameterised dict (or `any` for the bare base).
    pub fn value_type(&self) -> PyType {
        if self.is_dict() {
            if let Some(&value) = self.inner.params().get(1) {
                return PyType::of(value);
            }
        }
        PyType::any()
    }

    /// Assignability: id equality, widening to `any`, the implicit
    /// `int` -> `double` widening, or containers with the same base whose
    /// component types are mutually assignable.
    pub fn can_assign_to(&self, target: &PyType) -> bool {
        if self.id() == target.id() || target.is_any() {
            return true;
        }
        if self.is_int() && target.is_double() {
            return true;
        }
        if self.is_container() && target.is_container() && self.base_id() == target.base_id() {
            let mine = self.inner.params();
            let theirs = target.inner.params();
            // A bare container base is compatible with any parameterisation.
            if mine.is_empty() || theirs.is_empty() {
                return true;
            }
            return mine.len() == theirs.len()
                && mine.iter().zip(theirs.iter()).all(|(&a, &b)| {
                    let a = PyType::of(a);
                    let b = PyType::of(b);
                    a.can_assign_to(&b) && b.can_assign_to(&a)
                });
        }
        false
    }
}

impl PartialEq for PyType {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for PyType {}

impl std::fmt::Debug for PyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PyType({})", self.name())
    }
}

impl std::fmt::Display for PyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Split `"K, V"` at the top-level comma, respecting bracket nesting.
fn split_top_level_comma(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(PyType::int().id(), TYPE_INT);
        assert_eq!(PyType::int().name(), "int");
        assert_eq!(
            registry().lookup_by_name("double").unwrap().id(),
            TYPE_DOUBLE
        );
        assert!(registry().lookup_by_name("quux").is_none());
    }

    #[test]
    fn test_list_type_interned() {
        let a = PyType::list_of(&PyType::int());
        let b = PyType::list_of(&PyType::int());
        assert_eq!(a.id(), LIST_BASE + TYPE_INT);
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(a.name(), "list[int]");
        assert_eq!(a.element_type(), PyType::int());
    }

    #[test]
    fn test_dict_type_interned() {
        let d = PyType::dict_of(&PyType::string(), &PyType::int());
        let d2 = PyType::dict_of(&PyType::string(), &PyType::int());
        assert_eq!(d.id(), DICT_BASE + TYPE_STRING);
        assert!(Arc::ptr_eq(&d.inner, &d2.inner));
        assert_eq!(d.key_type(), PyType::string());
        assert_eq!(d.value_type(), PyType::int());
    }

    #[test]
    fn test_nested_list_does_not_spill_bands() {
        let inner = PyType::list_of(&PyType::int());
        let outer = PyType::list_of(&inner);
        assert_eq!(outer.id(), LIST_BASE + TYPE_ANY);
        assert!(outer.id() < DICT_BASE);
        assert!(outer.is_list());
    }

    #[test]
    fn test_base_type_id() {
        assert_eq!(base_type_id(LIST_BASE + TYPE_INT), TYPE_LIST);
        assert_eq!(base_type_id(DICT_BASE + TYPE_STRING), TYPE_DICT);
        assert_eq!(base_type_id(TYPE_BOOL), TYPE_BOOL);
    }

    #[test]
    fn test_feature_predicates() {
        assert!(PyType::int().is_numeric());
        assert!(!PyType::int().is_reference());
        assert!(PyType::string().is_reference());
        assert!(PyType::string().is_sequence());
        assert!(!PyType::string().is_container());
        assert!(PyType::list().is_container());
        assert!(PyType::list().is_reference());
        assert!(PyType::any().is_reference());
    }

    #[test]
    fn test_assignability() {
        assert!(PyType::int().can_assign_to(&PyType::int()));
        assert!(PyType::int().can_assign_to(&PyType::double()));
        assert!(!PyType::double().can_assign_to(&PyType::int()));
        assert!(PyType::string().can_assign_to(&PyType::any()));
        assert!(!PyType::string().can_assign_to(&PyType::int()));

        let li = PyType::list_of(&PyType::int());
        let li2 = PyType::list_of(&PyType::int());
        let ls = PyType::list_of(&PyType::string());
        assert!(li.can_assign_to(&li2));
        assert!(!li.can_assign_to(&ls));
        assert!(li.can_assign_to(&PyType::list()));
        assert!(PyType::list().can_assign_to(&li));
    }

    #[test]
    fn test_from_annotation() {
        assert_eq!(PyType::from_annotation("int"), PyType::int());
        assert_eq!(PyType::from_annotation("float"), PyType::double());
        assert_eq!(PyType::from_annotation("str"), PyType::string());
        assert_eq!(
            PyType::from_annotation("list[int]"),
            PyType::list_of(&PyType::int())
        );
        assert_eq!(
            PyType::from_annotation("dict[str, int]"),
            PyType::dict_of(&PyType::string(), &PyType::int())
        );
        // Unknown names resolve to any.
        assert_eq!(PyType::from_annotation("Widget"), PyType::any());
        // Nested parameterisation parses recursively.
        let nested = PyType::from_annotation("list[list[int]]");
        assert!(nested.is_list());
    }

    #[test]
    fn test_repeated_lookups_idempotent() {
        let first = PyType::list_of(&PyType::double());
        for _ in 0..10 {
            let again = PyType::list_of(&PyType::double());
            assert!(Arc::ptr_eq(&first.inner, &again.inner));
        }
    }
}
