use std::sync::Arc;

use aspectwerkz::loader::ClassLoader;
use aspectwerkz::reflect::classfile::{BytecodeSource, ClassFileError};
use aspectwerkz::reflect::descriptor::{field_type, method_types};
use aspectwerkz::reflect::{ClassInfo, ClassSource, Modifiers, TypeKind};
use aspectwerkz::AspectSystem;

struct CpBuilder {
    entries: Vec<Vec<u8>>,
}

impl CpBuilder {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut entry = Vec::new();
        entry.push(1);
        entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
        entry.extend_from_slice(s.as_bytes());
        self.push(entry)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = Vec::new();
        entry.push(7);
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push(entry)
    }

    fn integer(&mut self, value: i32) -> u16 {
        let mut entry = Vec::new();
        entry.push(3);
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(entry)
    }
}

fn u1(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

fn u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_attr(out: &mut Vec<u8>, name_index: u16, info: &[u8]) {
    u2(out, name_index);
    u4(out, info.len() as u32);
    out.extend_from_slice(info);
}

/// One annotation without element values.
fn marker_annotation(type_index: u16) -> Vec<u8> {
    let mut info = Vec::new();
    u2(&mut info, 1);
    u2(&mut info, type_index);
    u2(&mut info, 0);
    info
}

/// `public class demo.OrderService extends demo.AbstractService implements demo.Service`
fn build_order_service() -> Vec<u8> {
    let mut cp = CpBuilder::new();

    let class_this = cp.class("demo/OrderService");
    let class_super = cp.class("demo/AbstractService");
    let class_iface = cp.class("demo/Service");
    let class_io = cp.class("java/io/IOException");

    let utf_count = cp.utf8("count");
    let utf_int = cp.utf8("I");
    let utf_total = cp.utf8("total");
    let utf_total_desc = cp.utf8("(Ljava/lang/String;[I)J");
    let utf_init = cp.utf8("<init>");
    let utf_init_desc = cp.utf8("(I)V");
    let utf_clinit = cp.utf8("<clinit>");
    let utf_void = cp.utf8("()V");

    let utf_code = cp.utf8("Code");
    let utf_exceptions = cp.utf8("Exceptions");
    let utf_constant_value = cp.utf8("ConstantValue");
    let utf_rva = cp.utf8("RuntimeVisibleAnnotations");
    let utf_ria = cp.utf8("RuntimeInvisibleAnnotations");
    let utf_source_file = cp.utf8("SourceFile");
    let utf_source_name = cp.utf8("OrderService.java");

    let utf_traced = cp.utf8("Ldemo/Traced;");
    let utf_entity = cp.utf8("Ldemo/Entity;");
    let utf_transient = cp.utf8("Ldemo/Transient;");
    let utf_value = cp.utf8("value");
    let utf_value_text = cp.utf8("orders");
    let const_int = cp.integer(7);

    let cp_count = (cp.entries.len() + 1) as u16;

    let mut bytes = Vec::new();
    u4(&mut bytes, 0xCAFEBABE);
    u2(&mut bytes, 0);
    u2(&mut bytes, 52);
    u2(&mut bytes, cp_count);
    for entry in cp.entries {
        bytes.extend_from_slice(&entry);
    }

    u2(&mut bytes, 0x0021);
    u2(&mut bytes, class_this);
    u2(&mut bytes, class_super);
    u2(&mut bytes, 1);
    u2(&mut bytes, class_iface);

    // fields: private int count, ConstantValue + invisible annotation
    u2(&mut bytes, 1);
    u2(&mut bytes, 0x0002);
    u2(&mut bytes, utf_count);
    u2(&mut bytes, utf_int);
    u2(&mut bytes, 2);
    let mut cv_info = Vec::new();
    u2(&mut cv_info, const_int);
    push_attr(&mut bytes, utf_constant_value, &cv_info);
    push_attr(&mut bytes, utf_ria, &marker_annotation(utf_transient));

    // methods: total, <init>, <clinit>
    u2(&mut bytes, 3);

    u2(&mut bytes, 0x0001);
    u2(&mut bytes, utf_total);
    u2(&mut bytes, utf_total_desc);
    u2(&mut bytes, 3);
    let mut code_info = Vec::new();
    u2(&mut code_info, 2);
    u2(&mut code_info, 3);
    u4(&mut code_info, 2);
    u1(&mut code_info, 0x09);
    u1(&mut code_info, 0xad);
    u2(&mut code_info, 0);
    u2(&mut code_info, 0);
    push_attr(&mut bytes, utf_code, &code_info);
    let mut exc_info = Vec::new();
    u2(&mut exc_info, 1);
    u2(&mut exc_info, class_io);
    push_attr(&mut bytes, utf_exceptions, &exc_info);
    let mut rva_info = Vec::new();
    u2(&mut rva_info, 1);
    u2(&mut rva_info, utf_traced);
    u2(&mut rva_info, 1);
    u2(&mut rva_info, utf_value);
    u1(&mut rva_info, b's');
    u2(&mut rva_info, utf_value_text);
    push_attr(&mut bytes, utf_rva, &rva_info);

    u2(&mut bytes, 0x0001);
    u2(&mut bytes, utf_init);
    u2(&mut bytes, utf_init_desc);
    u2(&mut bytes, 0);

    u2(&mut bytes, 0x0008);
    u2(&mut bytes, utf_clinit);
    u2(&mut bytes, utf_void);
    u2(&mut bytes, 0);

    // class attributes
    u2(&mut bytes, 2);
    let mut sf_info = Vec::new();
    u2(&mut sf_info, utf_source_name);
    push_attr(&mut bytes, utf_source_file, &sf_info);
    push_attr(&mut bytes, utf_rva, &marker_annotation(utf_entity));

    bytes
}

#[test]
fn describes_hierarchy_and_members() {
    let info = ClassInfo::from_class_bytes(&build_order_service()).expect("read class file");

    assert_eq!(info.name, "demo.OrderService");
    assert_eq!(info.kind, TypeKind::Class);
    assert!(info.modifiers.is_public());
    assert_eq!(info.superclass.as_deref(), Some("demo.AbstractService"));
    assert_eq!(info.interfaces, vec!["demo.Service".to_string()]);
    assert!(info.has_annotation("demo.Entity"));
    assert!(info.has_annotation("Entity"));

    let field = info.field("count").expect("count field");
    assert_eq!(field.type_name, "int");
    assert_eq!(field.declaring_type, "demo.OrderService");
    assert!(field.modifiers.contains(Modifiers::PRIVATE));
    assert!(field.has_annotation("Transient"));

    let method = info.method("total", &["java.lang.String", "int[]"]).expect("total method");
    assert_eq!(method.return_type, "long");
    assert_eq!(method.exception_types, vec!["java.io.IOException".to_string()]);
    let traced = method.annotations.iter().find(|a| a.is("Traced")).expect("traced annotation");
    assert_eq!(traced.values.get("value").map(String::as_str), Some("orders"));
}

#[test]
fn constructors_kept_and_class_initializer_skipped() {
    let info = ClassInfo::from_class_bytes(&build_order_service()).expect("read class file");

    assert_eq!(info.methods.len(), 1);
    assert_eq!(info.constructors.len(), 1);
    assert!(info.constructor(&["int"]).is_some());
    assert!(info.methods_named("<clinit>").next().is_none());
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = build_order_service();
    bytes[0] = 0xCB;
    assert!(matches!(ClassInfo::from_class_bytes(&bytes), Err(ClassFileError::InvalidMagic(_))));
}

#[test]
fn rejects_truncated_input() {
    let bytes = build_order_service();
    for len in [0, 3, 10, bytes.len() / 2, bytes.len() - 1] {
        assert_eq!(
            ClassInfo::from_class_bytes(&bytes[..len]).unwrap_err(),
            ClassFileError::UnexpectedEof,
            "length {len}"
        );
    }
}

#[test]
fn descriptors_to_source_names() {
    assert_eq!(field_type("I").unwrap(), "int");
    assert_eq!(field_type("[[Ljava/lang/String;").unwrap(), "java.lang.String[][]");
    assert_eq!(field_type("Ljava/util/Map$Entry;").unwrap(), "java.util.Map$Entry");
    assert!(field_type("V").is_ok());
    assert!(field_type("[V").is_err());
    assert!(field_type("Ljava/lang/String").is_err());
    assert!(field_type("II").is_err());

    let (params, ret) = method_types("(I[Ljava/lang/String;)J").unwrap();
    assert_eq!(params, vec!["int".to_string(), "java.lang.String[]".to_string()]);
    assert_eq!(ret, "long");
    assert!(method_types("()").is_err());
    assert!(method_types("I)V").is_err());
}

#[test]
fn bytecode_source_describes_on_demand() {
    let source = BytecodeSource::new();
    source.add("demo/OrderService.class", build_order_service());
    source.add("demo/Broken.class", vec![0xCA, 0xFE]);
    assert_eq!(source.len(), 2);

    assert_eq!(source.describe("demo.OrderService").map(|c| c.name), Some("demo.OrderService".to_string()));
    assert!(source.describe("demo.Broken").is_none());
    assert!(source.describe("demo.Missing").is_none());
}

#[test]
fn loader_backed_by_bytecode_resolves_lazily() {
    let source = BytecodeSource::new();
    source.add("demo/OrderService", build_order_service());
    let loader = ClassLoader::with_source("app", None, Arc::new(source));
    let system = AspectSystem::default();

    assert!(system.repository(&loader).is_empty());
    let info = system.class_info(&loader, "demo.OrderService").expect("described");
    assert_eq!(info.superclass.as_deref(), Some("demo.AbstractService"));
    assert!(system.repository(&loader).contains("demo.OrderService"));
}
