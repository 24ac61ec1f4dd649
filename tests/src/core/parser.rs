//! Front-end acceptance over whole translation units, as opposed to the
//! snippet-sized cases the parser's own tests cover.

use umbra_core::ast::{CType, Decl, TypedefKind};
use umbra_core::parser::parse_unit;
use umbra_utils::errors::ParseError;

const CONTROL_FLOW: &str = include_str!("../../../corpus/control_flow.c");
const FIBONACCI: &str = include_str!("../../../corpus/fibonacci.c");
const STRINGS: &str = include_str!("../../../corpus/strings.c");
const RECORDS: &str = include_str!("../../../corpus/records.c");
const COMMANDS: &str = include_str!("../../../corpus/commands.c");

fn function_names(source: &str) -> Vec<String> {
    let unit = parse_unit(source, "corpus.c").unwrap();
    unit.decls
        .iter()
        .filter_map(|decl| match decl {
            Decl::Function(f) => Some(f.name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn corpus_parses_cleanly() {
    for (file, source) in [
        ("control_flow.c", CONTROL_FLOW),
        ("fibonacci.c", FIBONACCI),
        ("strings.c", STRINGS),
        ("records.c", RECORDS),
        ("commands.c", COMMANDS),
    ] {
        parse_unit(source, file).unwrap_or_else(|err| panic!("{file}: {err}"));
    }
}

#[test]
fn functions_keep_their_source_order() {
    assert_eq!(
        function_names(CONTROL_FLOW),
        ["process_value", "complex_switch", "complex_loops", "main"]
    );
    assert_eq!(
        function_names(STRINGS),
        ["check_password", "greet", "main"]
    );
}

#[test]
fn record_declarations_parse_into_their_shapes() {
    let unit = parse_unit(RECORDS, "records.c").unwrap();
    assert_eq!(unit.includes, ["<stdio.h>"]);

    let Decl::Enum(color) = &unit.decls[0] else {
        panic!("expected the Color enum first, got {:?}", unit.decls[0]);
    };
    assert_eq!(color.tag.as_deref(), Some("Color"));
    assert_eq!(color.variants.len(), 3);

    let Decl::Typedef(point) = &unit.decls[1] else {
        panic!("expected the Point typedef");
    };
    assert_eq!(point.name, "Point");
    let TypedefKind::InlineStruct(fields) = &point.underlying else {
        panic!("Point should wrap an inline struct");
    };
    assert_eq!(fields.len(), 2);

    // The typedef registered above must already act as a type name inside
    // the next declaration.
    let Decl::Struct(segment) = &unit.decls[2] else {
        panic!("expected struct Segment");
    };
    assert_eq!(segment.fields[0].ty, CType::Named("Point".into()));
    assert_eq!(segment.fields[2].ty, CType::Enum("Color".into()));

    let Decl::Typedef(length) = &unit.decls[3] else {
        panic!("expected the Length typedef");
    };
    assert_eq!(length.underlying, TypedefKind::Plain(CType::Int));

    let Decl::Function(manhattan) = &unit.decls[4] else {
        panic!("expected manhattan");
    };
    assert!(manhattan.is_static);
    assert_eq!(manhattan.ret, CType::Named("Length".into()));
    assert_eq!(manhattan.params.len(), 2);
}

#[test]
fn includes_survive_in_order() {
    let unit = parse_unit(COMMANDS, "commands.c").unwrap();
    assert_eq!(unit.includes, ["<stdio.h>", "<string.h>"]);
}

#[test]
fn rejection_points_at_the_offending_line() {
    let source = "#include <stdio.h>\n\
                  int scale(int x) {\n\
                      return x * 2;\n\
                  }\n\
                  int main(void) {\n\
                      double d = 1.5;\n\
                      return 0;\n\
                  }\n";
    let err = parse_unit(source, "bad.c").unwrap_err();
    match err {
        ParseError::Unsupported {
            file,
            line,
            construct,
            ..
        } => {
            assert_eq!(file, "bad.c");
            assert_eq!(line, 6);
            assert_eq!(construct, "`double`");
        }
        other => panic!("expected an unsupported-construct error, got {other}"),
    }
}

#[test]
fn cast_rejection_names_the_construct() {
    let source = "int main(void) {\n    char c = 'a';\n    int x = (int)c;\n    return x;\n}\n";
    let err = parse_unit(source, "bad.c").unwrap_err();
    match err {
        ParseError::Unsupported {
            line, construct, ..
        } => {
            assert_eq!(line, 3);
            assert!(construct.contains("cast"), "got: {construct}");
        }
        other => panic!("expected an unsupported-construct error, got {other}"),
    }
}
