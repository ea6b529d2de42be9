use bumpalo::Bump;
use pretty_assertions::assert_eq;

use super::{LinkError, Program, ProgramMetadata, SchemaTable, create_program};
use crate::{
    String, ToString, Vec,
    api::CompilationOptions,
    ast::{ExprBuilder, Module, ModuleIndex},
    compiler::{Compilation, ConstantKey, FunctionKey},
    linker::Callable,
    stdlib,
    values::Literal,
    vm::Instruction,
};

fn link<'a>(modules: &[&'a Module<'a>], schemas: &SchemaTable) -> Result<Program, LinkError> {
    let registry = stdlib::registry();
    let index = ModuleIndex::from_modules(modules);
    let mut compilation = Compilation::new(&registry, &index, CompilationOptions::default());
    for module in modules {
        compilation.compile_module(module.name).unwrap();
    }
    let (modules, data, closures) = compilation.into_parts();
    create_program(
        ProgramMetadata::new("test"),
        modules,
        data,
        closures,
        schemas,
    )
}

fn order(program: &Program) -> Vec<String> {
    program.constant_order().map(ToString::to_string).collect()
}

#[test]
fn test_link_orders_constants_after_their_dependencies() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let main = b.module(
        "main",
        &[],
        &[],
        &[
            b.constant_decl("total", b.tuple(&[b.constant("main", "base"), b.int(1)])),
            b.constant_decl("base", b.int(2)),
            b.constant_decl("free", b.int(3)),
        ],
        &[],
    );
    let program = link(&[main], &SchemaTable::new()).unwrap();
    assert_eq!(order(&program), ["main.base", "main.total", "main.free"]);
    assert!(
        program.constant_address("main", "base").unwrap()
            < program.constant_address("main", "total").unwrap()
    );
    assert_eq!(
        program.constant_address("main", "base"),
        Some(program.constants_base())
    );
}

#[test]
fn test_link_follows_dependencies_through_functions_and_closures() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let main = b.module(
        "main",
        &[],
        &[
            b.function("read", b.lambda("x", b.constant("main", "late"))),
            // A closure built by a function, reading another constant.
            b.function(
                "make",
                b.lambda("x", b.lambda("y", b.constant("main", "later"))),
            ),
        ],
        &[
            b.constant_decl("direct", b.call(b.global("main", "read"), b.nil())),
            b.constant_decl("nested", b.global("main", "make")),
            b.constant_decl("late", b.int(1)),
            b.constant_decl("later", b.int(2)),
        ],
        &[],
    );
    let program = link(&[main], &SchemaTable::new()).unwrap();
    assert_eq!(
        order(&program),
        ["main.late", "main.direct", "main.later", "main.nested"]
    );
}

#[test]
fn test_link_reports_circular_constants() {
    crate::test_utils::init_test_logging();
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let main = b.module(
        "main",
        &[],
        &[],
        &[
            b.constant_decl("fine", b.int(0)),
            b.constant_decl("a", b.constant("main", "b")),
            b.constant_decl("b", b.tuple(&[b.constant("main", "a"), b.int(1)])),
            b.constant_decl("after", b.constant("main", "a")),
        ],
        &[],
    );
    match link(&[main], &SchemaTable::new()) {
        Err(LinkError::CircularConstants { names, .. }) => {
            assert_eq!(names, ["main.a", "main.b", "main.after"]);
        }
        other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_link_reports_a_constant_reaching_itself_through_a_function() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let main = b.module(
        "main",
        &[],
        &[b.function("get", b.lambda("x", b.constant("main", "value")))],
        &[b.constant_decl("value", b.call(b.global("main", "get"), b.nil()))],
        &[],
    );
    let err = link(&[main], &SchemaTable::new()).unwrap_err();
    assert_eq!(err.to_string(), "circular constant dependency between main.value");
}

#[test]
fn test_link_reports_unresolved_references() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let calls_missing = b.module(
        "main",
        &[],
        &[b.function(
            "f",
            b.lambda("x", b.call(b.global("other", "g"), b.local("x"))),
        )],
        &[],
        &[],
    );
    assert_eq!(
        link(&[calls_missing], &SchemaTable::new()).unwrap_err(),
        LinkError::UnresolvedFunction {
            key: FunctionKey::new("other", "g", 0),
            from: String::from("main.f"),
        }
    );

    let reads_missing = b.module(
        "main",
        &[],
        &[],
        &[b.constant_decl("c", b.constant("main", "missing"))],
        &[],
    );
    assert_eq!(
        link(&[reads_missing], &SchemaTable::new()).unwrap_err(),
        LinkError::UnresolvedConstant {
            key: ConstantKey::new("main", "missing"),
            from: String::from("main.c"),
        }
    );
}

#[test]
fn test_link_rejects_unknown_schemas() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let main = b.module(
        "main",
        &[],
        &[b.function("f", b.lambda("x", b.decode(1, b.local("x"))))],
        &[],
        &[],
    );
    assert_eq!(
        link(&[main], &SchemaTable::from_names(&["json"])).unwrap_err(),
        LinkError::UnknownSchema {
            index: 1,
            from: String::from("main.f"),
        }
    );
    assert!(link(&[main], &SchemaTable::from_names(&["json", "csv"])).is_ok());
}

#[test]
fn test_link_lays_out_the_global_address_space() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let lib = b.module(
        "lib",
        &[],
        &[b.native_function("add", "int.add")],
        &[],
        &[],
    );
    let main = b.module(
        "main",
        &["lib"],
        &[
            b.function(
                "f",
                b.lambda("x", b.call(b.global("lib", "add"), b.local("x"))),
            ),
            b.function("g", b.lambda("x", b.lambda("y", b.int(7)))),
        ],
        &[b.constant_decl("k", b.str("seven"))],
        &[],
    );
    let program = link(&[lib, main], &SchemaTable::new()).unwrap();

    // [data][functions][closures][constants]
    assert_eq!(program.data, [Literal::Int(7), Literal::Str("seven".into())]);
    assert_eq!(program.functions_base(), 2);
    assert_eq!(program.function_address("lib", "add", 0), Some(2));
    assert_eq!(program.function_address("main", "f", 0), Some(3));
    assert_eq!(program.function_address("main", "g", 0), Some(4));
    assert_eq!(program.closures_base(), 5);
    assert_eq!(program.constant_address("main", "k"), Some(6));
    assert_eq!(program.global_count(), 7);

    assert!(program.callable(1).is_none());
    assert!(matches!(program.callable(2), Some(Callable::Native(_))));
    assert!(matches!(program.callable(5), Some(Callable::Compiled(_))));
    assert!(program.callable(6).is_none());

    // Operands now hold addresses, not dependency indexes.
    let f = program.functions[1].as_compiled().unwrap();
    assert_eq!(f.code.instructions()[1], Instruction::global(2).unwrap());
    assert_eq!(program.closures[0].code.instructions()[0], Instruction::global(0).unwrap());
    let k = &program.constants[0].initializer;
    assert_eq!(k.code.instructions()[0], Instruction::global(1).unwrap());
}

#[test]
fn test_program_survives_postcard_round_trip() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let main = b.module(
        "main",
        &[],
        &[b.function(
            "f",
            b.lambda("x", b.tuple(&[b.local("x"), b.float(1.5), b.encode(0, b.local("x"))])),
        )],
        &[b.constant_decl("k", b.array(&[b.int(1), b.int(2)]))],
        &[b.constant("main", "k")],
    );
    let program = link(&[main], &SchemaTable::from_names(&["json"])).unwrap();
    let bytes = program.to_bytes().unwrap();
    let restored = Program::from_bytes(&bytes).unwrap();
    assert_eq!(restored, program);
    assert_eq!(restored.function_address("main", "f", 0), program.function_address("main", "f", 0));
    assert_eq!(restored.schemas, ["json"]);
}

#[test]
fn test_schema_table_deduplicates_names() {
    let mut schemas = SchemaTable::new();
    assert_eq!(schemas.register("json"), 0);
    assert_eq!(schemas.register("csv"), 1);
    assert_eq!(schemas.register("json"), 0);
    assert_eq!(schemas.len(), 2);
    assert_eq!(schemas.get(1), Some("csv"));
    assert_eq!(schemas.get(2), None);
}
