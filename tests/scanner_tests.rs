//! Integration tests for the directive scanner against realistic header
//! fragments, exercised through the public crate surface.

use pyglue::{ModuleBuilder, Scanner};

fn scan(text: &str) -> Scanner {
    let mut scanner = Scanner::new(ModuleBuilder::new("testmod"));
    scanner.scan(text);
    scanner
}

#[test]
fn scans_a_realistic_header_fragment() {
    let header = r#"
#define AFF4_NAMESPACE "aff4:"
#define MAX_CACHED_FILESIZE 1e6

// An AFFObject is the base class.
CLASS(AFFObject, )
     // The URN of this object.
     char *urn;

     AFFObject METHOD(AFFObject, Con, char *urn, char mode);

     // Is this object valid?
     int METHOD(AFFObject, finish);
END_CLASS

CLASS(FileLikeObject, AFFObject)
     uint64_t size;

     uint64_t METHOD(FileLikeObject, seek, uint64_t offset, int whence);
     int METHOD(FileLikeObject, write, char *data, int len);
END_CLASS
"#;
    let scanner = scan(header);
    let builder = scanner.builder();

    let base = builder.class("AFFObject").unwrap();
    assert_eq!(base.methods.len(), 1);
    assert!(base.constructor.is_some());
    assert_eq!(base.getattr.attributes.len(), 1);
    assert!(base.methods[0].docstring.contains("Is this object valid?"));

    let derived = builder.class("FileLikeObject").unwrap();
    assert_eq!(derived.base_name.as_deref(), Some("AFFObject"));
    // Cloned method plus two of its own.
    assert_eq!(derived.methods.len(), 3);
    // Inherited attribute plus its own.
    assert_eq!(derived.getattr.attributes.len(), 2);
}

#[test]
fn unknown_types_degrade_without_aborting() {
    let scanner = scan(
        "CLASS(Foo, )\n  Foo METHOD(Foo, Con);\n  struct rusage METHOD(Foo, stats, struct rusage usage);\n  struct rusage load;\nEND_CLASS\n",
    );
    let class = scanner.builder().class("Foo").unwrap();

    // The method survives with the bad argument dropped and a Void return.
    assert_eq!(class.methods.len(), 1);
    assert!(class.methods[0].args.is_empty());
    // The attribute is dropped entirely.
    assert!(class.getattr.attributes.is_empty());
}

#[test]
fn redeclaring_a_class_replaces_it() {
    let scanner = scan(
        "CLASS(Foo, )\n  Foo METHOD(Foo, Con);\n  int METHOD(Foo, old);\nEND_CLASS\nCLASS(Foo, )\n  Foo METHOD(Foo, Con);\n  int METHOD(Foo, new_one);\nEND_CLASS\n",
    );
    let class = scanner.builder().class("Foo").unwrap();
    assert_eq!(class.methods.len(), 1);
    assert_eq!(class.methods[0].name, "new_one");
}

#[test]
fn struct_attributes_attach_to_the_struct_context() {
    let scanner = scan(
        "BOUND typedef struct XSDInteger {\n  int64_t value;\n};\n",
    );
    let class = scanner.builder().class("XSDInteger").unwrap();
    assert_eq!(class.getattr.attributes.len(), 1);
    assert_eq!(class.getattr.attributes[0].1.name, "value");
}

#[test]
fn class_registration_makes_the_name_dispatchable() {
    let scanner = scan("CLASS(Resolver, )\n  Resolver METHOD(Resolver, Con);\nEND_CLASS\n");
    let marshaler = scanner
        .builder()
        .registry()
        .dispatch("r", "Resolver")
        .unwrap();
    assert_eq!(marshaler.call_arg(), "r->base");
}
