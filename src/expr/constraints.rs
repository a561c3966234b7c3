use super::{ArrayElement, CompareFamily, ConstantValue, ExprArena, ExprId, NumericFamily, Operator};
use crate::jvm::code::InvokeType;
use crate::jvm::BinaryName;
use crate::locals::LocalTable;
use crate::types::{PrimitiveKinds, Type, TypeContext};

/// The typing rules of every operator
///
/// For a node, [`Constraints::result`] is the set of types the node's value can have given its
/// operator and its children, while [`Constraints::operand`] is the set of types the node accepts
/// for one of its children. Both only ever shrink as the types they are computed from shrink.
pub struct Constraints<'a, 'g> {
    pub tcx: TypeContext<'g>,
    pub arena: &'a ExprArena<'g>,
    pub locals: &'a LocalTable<'g>,
}

impl<'a, 'g> Constraints<'a, 'g> {
    fn child_type(&self, id: ExprId, index: usize) -> Type<'g> {
        match self.arena[id].children.get(index) {
            Some(child) => self.arena[*child].ty,
            None => Type::Unknown,
        }
    }

    /// Constraint on the value of a node
    pub fn result(&self, id: ExprId) -> Type<'g> {
        let tcx = self.tcx;
        let node = &self.arena[id];
        match &node.operator {
            Operator::Nop => Type::Unknown,
            Operator::Constant(value) => match value {
                ConstantValue::Int(value) => Type::Primitive(int_constant_kinds(*value)),
                ConstantValue::Long(_) => Type::LONG,
                ConstantValue::Float(_) => Type::FLOAT,
                ConstantValue::Double(_) => Type::DOUBLE,
                ConstantValue::String(_) => tcx.class(&BinaryName::STRING),
                ConstantValue::Class(_) => tcx.class(&BinaryName::CLASS),
                ConstantValue::Null => Type::Null,
            },
            Operator::This(class) => tcx.class(class),
            Operator::LocalLoad(local) => self.locals.ty(*local),
            Operator::LocalStore { local, value_used } => {
                if *value_used {
                    self.locals.ty(*local)
                } else {
                    Type::Void
                }
            }
            Operator::FieldGet(access) => tcx.field_type(&access.field.descriptor),
            Operator::FieldPut { access, value_used } => {
                if *value_used {
                    tcx.field_type(&access.field.descriptor)
                } else {
                    Type::Void
                }
            }
            Operator::ArrayLoad(element) => {
                let stored = element_of(tcx, self.child_type(id, 0));
                match element {
                    ArrayElement::Primitive(kinds) => tcx.intersect(Type::Primitive(*kinds), stored),
                    ArrayElement::Reference => tcx.intersect(tcx.any_reference(), stored),
                }
            }
            Operator::ArrayStore { value_used, .. } => {
                if *value_used {
                    self.child_type(id, 2)
                } else {
                    Type::Void
                }
            }
            Operator::ArrayLength | Operator::Cmp(..) => Type::INT,
            Operator::Binary(op, NumericFamily::Int) if op.is_bitwise() => {
                let (first, second) = (self.child_type(id, 0), self.child_type(id, 1));
                if first == Type::BOOLEAN || second == Type::BOOLEAN {
                    Type::BOOLEAN
                } else if excludes_boolean(first) || excludes_boolean(second) {
                    Type::INT
                } else {
                    Type::BOOL_INT
                }
            }
            Operator::Binary(_, family) | Operator::Negate(family) => natural_type(*family),
            Operator::Compare(..)
            | Operator::InstanceOf(_)
            | Operator::Not
            | Operator::LogicalAnd
            | Operator::LogicalOr => Type::BOOLEAN,
            Operator::Convert { to, .. } => Type::Primitive(PrimitiveKinds::from(*to)),
            Operator::Invoke { method, .. } => {
                tcx.return_type(method.descriptor.return_type.as_ref())
            }
            Operator::InvokeDynamic { descriptor, .. } => {
                tcx.return_type(descriptor.return_type.as_ref())
            }
            Operator::New { class, .. } => tcx.class(class),
            Operator::NewArray { array, .. } => tcx.ref_type(array),
            Operator::CheckCast(typ) => tcx.ref_type(typ),
            Operator::Thrown(catch_type) => {
                tcx.class(catch_type.as_ref().unwrap_or(&BinaryName::THROWABLE))
            }
            Operator::CheckNull => self.child_type(id, 0),
            Operator::Monitor(_) => Type::Void,
        }
    }

    /// Constraint on the `index`-th child of a node
    pub fn operand(&self, id: ExprId, index: usize) -> Type<'g> {
        let tcx = self.tcx;
        let node = &self.arena[id];
        let sibling = || self.child_type(id, 1 - index.min(1));
        match &node.operator {
            Operator::LocalStore { local, .. } => tcx.sub_types(self.locals.ty(*local)),
            Operator::FieldGet(access) => tcx.sub_types(tcx.class(&access.field.class)),
            Operator::FieldPut { access, .. } => {
                if !access.is_static && index == 0 {
                    tcx.sub_types(tcx.class(&access.field.class))
                } else {
                    tcx.sub_types(tcx.field_type(&access.field.descriptor))
                }
            }
            Operator::ArrayLoad(element) => match index {
                0 => {
                    let loaded = match element {
                        ArrayElement::Primitive(kinds) => Type::Primitive(*kinds),
                        ArrayElement::Reference => tcx.any_reference(),
                    };
                    arrays_of(tcx, or_else(tcx.intersect(loaded, node.ty), loaded))
                }
                _ => Type::U_INT,
            },
            Operator::ArrayStore { element, .. } => match (index, element) {
                (0, ArrayElement::Primitive(kinds)) => {
                    let kinds = Type::Primitive(*kinds);
                    arrays_of(tcx, or_else(tcx.intersect(kinds, self.child_type(id, 2)), kinds))
                }
                (0, ArrayElement::Reference) => arrays_of(tcx, tcx.any_reference()),
                (1, _) => Type::U_INT,
                (_, element) => {
                    let allowed = match element {
                        ArrayElement::Primitive(kinds) => Type::Primitive(*kinds),
                        ArrayElement::Reference => tcx.any_reference(),
                    };
                    let stored = element_of(tcx, self.child_type(id, 0));
                    tcx.sub_types(or_else(tcx.intersect(allowed, stored), allowed))
                }
            },
            Operator::ArrayLength => arrays_of(tcx, Type::Unknown),
            Operator::Binary(op, NumericFamily::Int) => {
                if op.is_bitwise() {
                    match node.ty {
                        typ if typ == Type::BOOLEAN => Type::BOOLEAN,
                        typ if excludes_boolean(typ) => Type::U_INT,
                        _ => int_or_boolean(sibling()),
                    }
                } else {
                    Type::U_INT
                }
            }
            Operator::Binary(op, NumericFamily::Long) if op.is_shift() && index == 1 => {
                Type::U_INT
            }
            Operator::Binary(_, family) | Operator::Negate(family) | Operator::Cmp(family, _) => {
                tcx.sub_types(natural_type(*family))
            }
            Operator::Compare(cmp, family) => match family {
                CompareFamily::Numeric(NumericFamily::Int) if cmp.is_equality() => {
                    int_or_boolean(sibling())
                }
                CompareFamily::Numeric(family) => tcx.sub_types(natural_type(*family)),
                CompareFamily::Reference => tcx.any_reference(),
            },
            Operator::Convert { from, .. } => {
                tcx.sub_types(Type::Primitive(PrimitiveKinds::from(*from)))
            }
            Operator::Invoke { kind, method } => {
                let has_receiver = *kind != InvokeType::Static;
                if has_receiver && index == 0 {
                    tcx.sub_types(tcx.class(&method.class))
                } else {
                    let parameter = index - usize::from(has_receiver);
                    match method.descriptor.parameters.get(parameter) {
                        Some(param) => tcx.sub_types(tcx.field_type(param)),
                        None => Type::Unknown,
                    }
                }
            }
            Operator::InvokeDynamic {
                descriptor: method_descriptor,
                ..
            }
            | Operator::New {
                constructor: method_descriptor,
                ..
            } => match method_descriptor.parameters.get(index) {
                Some(param) => tcx.sub_types(tcx.field_type(param)),
                None => Type::Unknown,
            },
            Operator::NewArray { .. } => Type::U_INT,
            Operator::InstanceOf(_)
            | Operator::CheckCast(_)
            | Operator::CheckNull
            | Operator::Monitor(_) => tcx.any_reference(),
            Operator::Not | Operator::LogicalAnd | Operator::LogicalOr => Type::BOOLEAN,
            Operator::Nop
            | Operator::Constant(_)
            | Operator::This(_)
            | Operator::LocalLoad(_)
            | Operator::Thrown(_) => Type::Unknown,
        }
    }
}

/// Kinds an `int` constant could be, based on its range
pub fn int_constant_kinds(value: i32) -> PrimitiveKinds {
    let mut kinds = PrimitiveKinds::INT;
    if value == 0 || value == 1 {
        kinds |= PrimitiveKinds::BOOLEAN;
    }
    if (-128..=127).contains(&value) {
        kinds |= PrimitiveKinds::BYTE;
    }
    if (-32768..=32767).contains(&value) {
        kinds |= PrimitiveKinds::SHORT;
    }
    if (0..=65535).contains(&value) {
        kinds |= PrimitiveKinds::CHAR;
    }
    kinds
}

fn natural_type<'g>(family: NumericFamily) -> Type<'g> {
    Type::Primitive(PrimitiveKinds::from(family.base_type()))
}

fn excludes_boolean(typ: Type) -> bool {
    matches!(typ, Type::Primitive(kinds) if !kinds.contains(PrimitiveKinds::BOOLEAN))
}

/// Operand of `==`, `!=`, `&`, `|`, `^` on the `int` stack type: either both sides are `boolean`
/// or neither is
fn int_or_boolean<'g>(sibling: Type<'g>) -> Type<'g> {
    match sibling {
        typ if typ == Type::BOOLEAN => Type::BOOLEAN,
        typ if excludes_boolean(typ) => Type::U_INT,
        _ => Type::BOOL_U_INT,
    }
}

fn or_else<'g>(typ: Type<'g>, fallback: Type<'g>) -> Type<'g> {
    if typ.is_error() {
        fallback
    } else {
        typ
    }
}

/// Possible element types of an array of the given type
pub fn element_of<'g>(tcx: TypeContext<'g>, array: Type<'g>) -> Type<'g> {
    let element = match array {
        Type::Array(element) => return *element,
        Type::Range(range) => match (range.bottom, range.top) {
            (Type::Array(element), _) => *element,
            (_, Type::Array(element)) => return or_upper(tcx, *element),
            _ => return Type::Unknown,
        },
        _ => return Type::Unknown,
    };
    match element {
        Type::Primitive(_) | Type::Unknown => element,
        reference => tcx.sub_types(reference),
    }
}

fn or_upper<'g>(tcx: TypeContext<'g>, element: Type<'g>) -> Type<'g> {
    match element {
        Type::Primitive(_) | Type::Unknown => element,
        reference => tcx.super_types(reference),
    }
}

/// Arrays (or `null`) whose elements are all in the given set
pub fn arrays_of<'g>(tcx: TypeContext<'g>, element: Type<'g>) -> Type<'g> {
    let bottom = match element {
        Type::Error => return Type::Error,
        Type::Null => tcx.any_reference(),
        Type::Range(range) => range.bottom,
        other => other,
    };
    tcx.sub_types(tcx.array(bottom))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::types::TypeArenas;

    #[test]
    fn constant_kinds() {
        assert_eq!(int_constant_kinds(1), PrimitiveKinds::BOOL_U_INT);
        assert_eq!(
            int_constant_kinds(-1),
            PrimitiveKinds::BYTE | PrimitiveKinds::SHORT | PrimitiveKinds::INT
        );
        assert_eq!(
            int_constant_kinds(200),
            PrimitiveKinds::SHORT | PrimitiveKinds::CHAR | PrimitiveKinds::INT
        );
        assert_eq!(int_constant_kinds(40_000), PrimitiveKinds::CHAR | PrimitiveKinds::INT);
        assert_eq!(int_constant_kinds(-40_000), PrimitiveKinds::INT);
    }

    #[test]
    fn array_elements() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let string = tcx.class(&BinaryName::STRING);
        let strings = tcx.array(string);
        assert!(element_of(tcx, strings) == string);
        assert!(element_of(tcx, tcx.sub_types(strings)) == tcx.sub_types(string));
        assert_eq!(element_of(tcx, tcx.array(Type::INT)), Type::INT);
        assert_eq!(element_of(tcx, Type::Unknown), Type::Unknown);

        assert!(arrays_of(tcx, Type::INT) == tcx.sub_types(tcx.array(Type::INT)));
        assert!(
            tcx.intersect(arrays_of(tcx, tcx.any_reference()), strings) == strings,
            "a String[] can be used where any object array is expected"
        );
        assert!(
            tcx.intersect(arrays_of(tcx, tcx.any_reference()), tcx.array(Type::INT)).is_error(),
            "but an int[] can't"
        );
    }
}
