use super::{PrimitiveKinds, Type, TypeContext};

/// Reserved words that can't be used as variable names
const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "null", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "true", "try", "void", "volatile", "while",
];

impl<'g> TypeContext<'g> {
    /// Single type that best represents the set, for declarations and printing
    ///
    /// Ranges prefer their required side, except that an unconstrained bottom (`Object`, or an
    /// array of anything) defers to the candidates on top.
    pub fn hint(&self, typ: Type<'g>) -> Type<'g> {
        match typ {
            Type::Primitive(kinds) => PrimitiveKinds::HINT_ORDER
                .iter()
                .find(|kind| kinds.contains(**kind))
                .map_or(Type::Error, |kind| Type::Primitive(*kind)),
            Type::Class(set) => match (set.class, set.interfaces.first()) {
                (Some(class), _) => self.class_of(class),
                (None, Some(interface)) => self.class_of(*interface),
                (None, None) => typ,
            },
            Type::Array(element) => self.array(self.hint(*element)),
            Type::Range(range) => {
                let open_bottom = range.bottom == self.object()
                    || matches!(range.bottom, Type::Array(element) if *element == Type::Unknown);
                if open_bottom && range.top != Type::Null {
                    self.hint(range.top)
                } else {
                    self.hint(range.bottom)
                }
            }
            Type::Null => self.object(),
            other => other,
        }
    }

    /// Variable name suggested by the type
    pub fn default_name(&self, typ: Type<'g>) -> String {
        match self.hint(typ) {
            Type::Primitive(kinds) => String::from(match kinds {
                PrimitiveKinds::BOOLEAN => "bool",
                PrimitiveKinds::BYTE => "b",
                PrimitiveKinds::CHAR => "c",
                PrimitiveKinds::SHORT => "s",
                PrimitiveKinds::LONG => "l",
                PrimitiveKinds::FLOAT => "f",
                PrimitiveKinds::DOUBLE => "d",
                _ => "i",
            }),
            Type::Class(set) => {
                let simple_name = match set.single() {
                    Some(class) => class.get().name.simple_name(),
                    None => "Object",
                };
                let mut chars = simple_name.chars();
                let name: String = match chars.next() {
                    Some(first) => first.to_lowercase().chain(chars).collect(),
                    None => String::from("object"),
                };
                if KEYWORDS.contains(&name.as_str()) {
                    format!("var_{}", name)
                } else {
                    name
                }
            }
            Type::Array(element) => format!("{}s", self.default_name(*element)),
            _ => String::from("local"),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::jvm::BinaryName;
    use crate::types::{Type, TypeArenas, TypeContext};

    #[test]
    fn hints() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        assert_eq!(tcx.hint(Type::BOOL_U_INT), Type::INT);
        assert_eq!(tcx.hint(Type::BOOL_BYTE), Type::BOOLEAN);
        assert!(tcx.hint(tcx.any_reference()) == tcx.object());

        let string = tcx.class(&BinaryName::STRING);
        assert!(tcx.hint(tcx.super_types(string)) == string, "Range(Object, String)");
        assert!(tcx.hint(tcx.sub_types(string)) == string);
        assert!(tcx.hint(tcx.array_interfaces()) == tcx.class(&BinaryName::SERIALIZABLE));
    }

    #[test]
    fn default_names() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        assert_eq!(tcx.default_name(Type::U_INT), "i");
        assert_eq!(tcx.default_name(Type::LONG), "l");
        assert_eq!(tcx.default_name(Type::BOOLEAN), "bool");
        assert_eq!(tcx.default_name(tcx.class(&BinaryName::ARRAYLIST)), "arrayList");
        assert_eq!(
            tcx.default_name(tcx.array(tcx.class(&BinaryName::STRING))),
            "strings"
        );
        assert_eq!(tcx.default_name(tcx.class(&BinaryName::CLASS)), "var_class");
        assert_eq!(tcx.default_name(Type::Unknown), "local");
    }
}
