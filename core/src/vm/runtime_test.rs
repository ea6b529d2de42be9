//! End-to-end tests: resolved modules through compiler, linker and VM.

use bumpalo::Bump;

use crate::{
    String, Vec,
    api::{EngineOptions, ExecutionOptions},
    ast::{ComponentPattern, ExprBuilder, FunctionDecl, IGNORE, Module, ModuleIndex, PatternBinding},
    compiler::Compilation,
    linker::{self, Program, ProgramMetadata, SchemaTable},
    natives::NativeRegistry,
    stdlib,
    values::Value,
    vm::{ExecutionErrorKind, SchemaCodec, Vm},
};

fn link(modules: &[&Module<'_>], schemas: &SchemaTable) -> Program {
    let registry = stdlib::registry();
    let index = ModuleIndex::from_modules(modules);
    let options = EngineOptions::default().default_compilation_options;
    let mut compilation = Compilation::new(&registry, &index, options);
    for module in modules {
        compilation.compile_module(module.name).unwrap();
    }
    let (modules, data, closures) = compilation.into_parts();
    linker::create_program(ProgramMetadata::new("test"), modules, data, closures, schemas).unwrap()
}

/// Native bindings the test modules call through `main.<name>`.
fn natives<'a>(b: &ExprBuilder<'a>) -> Vec<FunctionDecl<'a>> {
    [
        ("add", "int.add"),
        ("sub", "int.sub"),
        ("lt", "int.lt"),
        ("eq", "int.eq"),
        ("map", "array.map"),
    ]
    .into_iter()
    .map(|(name, external)| b.native_function(name, external))
    .collect()
}

fn main_module<'a>(
    b: &ExprBuilder<'a>,
    functions: &[FunctionDecl<'a>],
    constants: &[crate::ast::ConstantDecl<'a>],
) -> &'a Module<'a> {
    let mut all = natives(b);
    all.extend_from_slice(functions);
    b.module("main", &[], &all, constants, &[])
}

fn options(max_frames: usize) -> ExecutionOptions {
    ExecutionOptions {
        max_frames,
        ..ExecutionOptions::default()
    }
}

fn call_main<'a>(vm: &mut Vm<'_, 'a>, name: &str, argument: Value<'a>) -> Value<'a> {
    let function = vm.function("main", name, 0).unwrap();
    vm.call(function, argument).unwrap()
}

#[test]
fn test_let_bindings_build_a_tuple() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let value = b.block(
        &[b.let_("x", b.int(1)), b.let_("y", b.int(2))],
        b.tuple(&[b.local("x"), b.local("y")]),
    );
    let program = link(&[main_module(&b, &[], &[b.constant_decl("pair", value)])], &SchemaTable::new());

    let registry = stdlib::registry();
    let values = Bump::new();
    let vm = Vm::new(&program, &registry, &values).unwrap();
    let pair = vm.constant("main", "pair").unwrap();
    assert_eq!(pair.as_tuple(), Some(&[Value::Int(1), Value::Int(2)][..]));
    assert_eq!(pair.to_string(), "(1, 2)");
}

#[test]
fn test_array_literals_nest_and_grow_linearly() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let pair = b.lambda("x", b.array(&[b.local("x"), b.local("x")]));
    let nested = b.array(&[
        b.array(&[]),
        b.call(b.global("main", "pair"), b.int(1)),
        b.array(&[b.int(2), b.array(&[])]),
        b.array(&[]),
    ]);
    let count = 4000;
    let elements: Vec<_> = (0..count as i64).map(|i| b.int(i)).collect();
    let constants = [
        b.constant_decl("nested", nested),
        b.constant_decl("big", b.array(&elements)),
    ];
    let program = link(
        &[main_module(&b, &[b.function("pair", pair)], &constants)],
        &SchemaTable::new(),
    );
    let registry = stdlib::registry();
    let values = Bump::new();
    let vm = Vm::new(&program, &registry, &values).unwrap();

    let nested = vm.constant("main", "nested").unwrap();
    assert_eq!(nested.to_string(), "[[], [1, 1], [2, []], []]");
    let big = vm.constant("main", "big").unwrap();
    let big = big.as_array().unwrap();
    assert_eq!(big.len(), count);
    assert_eq!(big[count - 1], Value::Int(count as i64 - 1));

    // Elements are written once into a slice sized by the hint.
    let bound = 8 * count * core::mem::size_of::<Value<'_>>();
    assert!(
        values.allocated_bytes() < bound,
        "{} arena bytes for {} elements",
        values.allocated_bytes(),
        count
    );
}

#[test]
fn test_float_literals_keep_their_sign() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let zeros = b.tuple(&[b.float(0.0), b.float(-0.0), b.float(0.0)]);
    let program = link(
        &[main_module(&b, &[], &[b.constant_decl("zeros", zeros)])],
        &SchemaTable::new(),
    );
    let registry = stdlib::registry();
    let values = Bump::new();
    let vm = Vm::new(&program, &registry, &values).unwrap();

    let zeros = vm.constant("main", "zeros").unwrap();
    let floats: Vec<f64> = zeros
        .as_tuple()
        .unwrap()
        .iter()
        .map(|value| value.as_float().unwrap())
        .collect();
    assert!(floats[0].is_sign_positive());
    assert!(floats[1].is_sign_negative());
    assert!(floats[2].is_sign_positive());
}

#[test]
fn test_switch_runs_only_the_matching_branch() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    // Every arm yields a distinct string so the result says which one ran.
    let classify = b.lambda(
        "v",
        b.switch(
            b.local("v"),
            &[
                b.case(0, PatternBinding::Whole("n"), b.tuple(&[b.str("a"), b.local("n")])),
                b.case(1, PatternBinding::Ignore, b.tuple(&[b.str("b"), b.int(0)])),
                b.default_case(PatternBinding::Ignore, b.tuple(&[b.str("default"), b.int(0)])),
            ],
        ),
    );
    let program = link(
        &[main_module(&b, &[b.function("classify", classify)], &[])],
        &SchemaTable::new(),
    );
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();

    let a = Value::sum(&values, 0, Value::Int(7));
    assert_eq!(call_main(&mut vm, "classify", a).to_string(), "(\"a\", 7)");
    let b_value = Value::sum(&values, 1, Value::Nil);
    assert_eq!(call_main(&mut vm, "classify", b_value).to_string(), "(\"b\", 0)");
    let other = Value::sum(&values, 5, Value::Nil);
    assert_eq!(
        call_main(&mut vm, "classify", other).to_string(),
        "(\"default\", 0)"
    );
}

#[test]
fn test_switch_destructures_tuple_payloads() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let swap = b.lambda(
        "v",
        b.switch(
            b.local("v"),
            &[
                b.case(
                    3,
                    b.fields(&["x", IGNORE, "z"]),
                    b.tuple(&[b.local("z"), b.local("x")]),
                ),
                b.default_case(PatternBinding::Whole("w"), b.local("w")),
            ],
        ),
    );
    let program = link(&[main_module(&b, &[b.function("swap", swap)], &[])], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();

    let payload = Value::tuple(&values, &[Value::Int(1), Value::Int(2), Value::Int(3)]);
    let matched = call_main(&mut vm, "swap", Value::sum(&values, 3, payload));
    assert_eq!(matched.to_string(), "(3, 1)");

    // The default arm binds the whole, still tagged, scrutinee.
    let unmatched = Value::sum(&values, 4, Value::Int(9));
    assert_eq!(call_main(&mut vm, "swap", unmatched), unmatched);
}

#[test]
fn test_multi_switch_matches_components_jointly() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let any = |binding| ComponentPattern { tag: None, binding };
    let tag = |tag, binding| ComponentPattern {
        tag: Some(tag),
        binding,
    };
    let both = b.lambda(
        "p",
        b.multi_switch(
            &[b.field(b.local("p"), 0), b.field(b.local("p"), 1)],
            &[
                b.multi_case(
                    &[tag(1, Some("x")), tag(1, Some("y"))],
                    b.call(b.global("main", "add"), b.tuple(&[b.local("x"), b.local("y")])),
                ),
                b.multi_case(&[tag(1, Some("x")), any(None)], b.local("x")),
                b.multi_case(&[any(None), tag(1, Some("y"))], b.local("y")),
                b.multi_default(b.int(0)),
            ],
        ),
    );
    let program = link(&[main_module(&b, &[b.function("both", both)], &[])], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();

    let some = |n| Value::sum(&values, 1, Value::Int(n));
    let none = Value::sum(&values, 0, Value::Nil);
    let mut run = |left, right| {
        let argument = Value::tuple(&values, &[left, right]);
        call_main(&mut vm, "both", argument)
    };
    assert_eq!(run(some(2), some(3)), Value::Int(5));
    assert_eq!(run(some(2), none), Value::Int(2));
    assert_eq!(run(none, some(3)), Value::Int(3));
    assert_eq!(run(none, none), Value::Int(0));
}

#[test]
fn test_closure_sees_captured_values() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    // adder = \k -> \x -> k + x
    let adder = b.lambda(
        "k",
        b.lambda(
            "x",
            b.call(b.global("main", "add"), b.tuple(&[b.local("k"), b.local("x")])),
        ),
    );
    let program = link(&[main_module(&b, &[b.function("adder", adder)], &[])], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();

    let add10 = call_main(&mut vm, "adder", Value::Int(10));
    assert!(matches!(add10, Value::Closure(closure) if closure.context == [Value::Int(10)]));
    assert_eq!(vm.call(add10, Value::Int(5)).unwrap(), Value::Int(15));
    let add1 = call_main(&mut vm, "adder", Value::Int(1));
    assert_eq!(vm.call(add1, Value::Int(5)).unwrap(), Value::Int(6));
    assert_eq!(vm.call(add10, Value::Int(0)).unwrap(), Value::Int(10));
}

#[test]
fn test_recursive_closure_calls_itself() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    // \n -> let rec count = \i -> if i < n then count(i + 1) else i; count(0)
    let count = b.lambda(
        "i",
        b.switch(
            b.call(b.global("main", "lt"), b.tuple(&[b.local("i"), b.local("n")])),
            &[
                b.case(
                    1,
                    PatternBinding::Ignore,
                    b.call(
                        b.local("count"),
                        b.call(b.global("main", "add"), b.tuple(&[b.local("i"), b.int(1)])),
                    ),
                ),
                b.case(0, PatternBinding::Ignore, b.local("i")),
            ],
        ),
    );
    let up_to = b.lambda(
        "n",
        b.block(
            &[b.let_rec("count", count)],
            b.call(b.local("count"), b.int(0)),
        ),
    );
    let program = link(&[main_module(&b, &[b.function("up_to", up_to)], &[])], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::with_options(&program, &registry, &values, options(16)).unwrap();

    assert_eq!(call_main(&mut vm, "up_to", Value::Int(0)), Value::Int(0));
    assert_eq!(call_main(&mut vm, "up_to", Value::Int(1000)), Value::Int(1000));
    assert!(vm.peak_frames() <= 2, "peak frames: {}", vm.peak_frames());
}

fn sum_module<'a>(b: &ExprBuilder<'a>, limit: i64) -> &'a Module<'a> {
    // sum = \p -> if p.0 < limit then sum((p.0 + 1, p.1 + p.0)) else p.1
    let p = || b.local("p");
    let add = |x, y| b.call(b.global("main", "add"), b.tuple(&[x, y]));
    let sum = b.lambda(
        "p",
        b.switch(
            b.call(b.global("main", "lt"), b.tuple(&[b.field(p(), 0), b.int(limit)])),
            &[
                b.case(
                    1,
                    PatternBinding::Ignore,
                    b.call(
                        b.global("main", "sum"),
                        b.tuple(&[add(b.field(p(), 0), b.int(1)), add(b.field(p(), 1), b.field(p(), 0))]),
                    ),
                ),
                b.case(0, PatternBinding::Ignore, b.field(p(), 1)),
            ],
        ),
    );
    main_module(b, &[b.function("sum", sum)], &[])
}

#[test]
fn test_tail_calls_run_in_constant_frames() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let program = link(&[sum_module(&b, 100_001)], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::with_options(&program, &registry, &values, options(4)).unwrap();

    let start = Value::tuple(&values, &[Value::Int(1), Value::Int(0)]);
    assert_eq!(call_main(&mut vm, "sum", start), Value::Int(5_000_050_000));
    assert_eq!(vm.peak_frames(), 1);
}

#[test]
fn test_deep_recursion_is_a_resource_error() {
    crate::test_utils::init_test_logging();
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    // depth = \n -> if n == 0 then 0 else 1 + depth(n - 1); not a tail call.
    let depth = b.lambda(
        "n",
        b.switch(
            b.call(b.global("main", "eq"), b.tuple(&[b.local("n"), b.int(0)])),
            &[
                b.case(1, PatternBinding::Ignore, b.int(0)),
                b.case(
                    0,
                    PatternBinding::Ignore,
                    b.call(
                        b.global("main", "add"),
                        b.tuple(&[
                            b.int(1),
                            b.call(
                                b.global("main", "depth"),
                                b.call(b.global("main", "sub"), b.tuple(&[b.local("n"), b.int(1)])),
                            ),
                        ]),
                    ),
                ),
            ],
        ),
    );
    let program = link(&[main_module(&b, &[b.function("depth", depth)], &[])], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::with_options(&program, &registry, &values, options(50)).unwrap();

    assert_eq!(call_main(&mut vm, "depth", Value::Int(20)), Value::Int(20));
    assert_eq!(vm.peak_frames(), 21);

    let function = vm.function("main", "depth", 0).unwrap();
    let err = vm.call(function, Value::Int(100)).unwrap_err();
    assert!(err.is_resource_exceeded());
    assert_eq!(err.trace.len(), 50);
    assert_eq!(vm.pooled_contexts(), ExecutionOptions::default().pool_size);
}

#[test]
fn test_runtime_error_reports_every_live_frame() {
    crate::test_utils::init_test_logging();
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let bad = b.lambda("x", b.field(b.local("x"), 0));
    let outer = b.lambda(
        "x",
        b.tuple(&[b.call(b.global("main", "bad"), b.local("x")), b.int(1)]),
    );
    let program = link(
        &[main_module(&b, &[b.function("bad", bad), b.function("outer", outer)], &[])],
        &SchemaTable::new(),
    );
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();
    let pooled = vm.pooled_contexts();

    let function = vm.function("main", "outer", 0).unwrap();
    let err = vm.call(function, Value::Int(3)).unwrap_err();
    assert!(matches!(
        err.kind,
        ExecutionErrorKind::TagMismatch {
            opcode: "POPGET",
            expected: "tuple",
            found: "int",
        }
    ));
    let names: Vec<&str> = err.trace.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(names, ["main.bad", "main.outer"]);
    // The failing frame points at the field access, not the declaration.
    assert_ne!(err.trace[0].at, err.trace[0].declared);

    // The context went back to the pool and the VM is still usable.
    assert_eq!(vm.pooled_contexts(), pooled);
    let pair = Value::tuple(&values, &[Value::Int(4), Value::Nil]);
    let result = vm.call(function, pair).unwrap();
    assert_eq!(result.to_string(), "(4, 1)");
}

#[test]
fn test_natives_call_back_into_closures() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    // shift = \k -> map((array, \x -> x + k))
    let shift = b.lambda(
        "k",
        b.call(
            b.global("main", "map"),
            b.tuple(&[
                b.array(&[b.int(1), b.int(2), b.int(3)]),
                b.lambda(
                    "x",
                    b.call(b.global("main", "add"), b.tuple(&[b.local("x"), b.local("k")])),
                ),
            ]),
        ),
    );
    let program = link(&[main_module(&b, &[b.function("shift", shift)], &[])], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();

    let shifted = call_main(&mut vm, "shift", Value::Int(10));
    assert_eq!(shifted.to_string(), "[11, 12, 13]");
    // `shift` stays live while `map` runs the closure.
    assert_eq!(vm.peak_frames(), 2);

    // Frames under a native count against the same limit.
    let mut vm = Vm::with_options(&program, &registry, &values, options(1)).unwrap();
    let function = vm.function("main", "shift", 0).unwrap();
    let err = vm.call(function, Value::Int(10)).unwrap_err();
    assert!(matches!(
        err.kind,
        ExecutionErrorKind::ResourceExceeded {
            depth: 2,
            max_frames: 1,
        }
    ));
}

#[test]
fn test_native_errors_carry_the_calling_frame() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let misuse = b.lambda("x", b.call(b.global("main", "add"), b.local("x")));
    let program = link(&[main_module(&b, &[b.function("misuse", misuse)], &[])], &SchemaTable::new());
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();

    let function = vm.function("main", "misuse", 0).unwrap();
    let err = vm.call(function, Value::Int(1)).unwrap_err();
    assert!(matches!(
        &err.kind,
        ExecutionErrorKind::Native { name, .. } if name == "int.add"
    ));
    assert_eq!(err.trace.len(), 1);
    assert_eq!(err.trace[0].function, "main.misuse");
}

struct CaseCodec;

impl SchemaCodec for CaseCodec {
    fn decode<'a>(&self, schema: &str, value: Value<'a>, arena: &'a Bump) -> Result<Value<'a>, String> {
        match (schema, value) {
            ("upper", Value::Str(s)) => Ok(Value::str(arena, &s.to_uppercase())),
            _ => Err(String::from("not a string")),
        }
    }

    fn encode<'a>(&self, schema: &str, value: Value<'a>, arena: &'a Bump) -> Result<Value<'a>, String> {
        match (schema, value) {
            ("upper", Value::Str(s)) => Ok(Value::str(arena, &s.to_lowercase())),
            _ => Err(String::from("not a string")),
        }
    }
}

#[test]
fn test_decode_and_encode_go_through_the_codec() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let schemas = SchemaTable::from_names(&["upper"]);
    let shout = b.lambda("s", b.decode(0, b.local("s")));
    let whisper = b.lambda("s", b.encode(0, b.local("s")));
    let program = link(
        &[main_module(&b, &[b.function("shout", shout), b.function("whisper", whisper)], &[])],
        &schemas,
    );
    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::with_codec(&program, &registry, &values, ExecutionOptions::default(), &CaseCodec)
        .unwrap();

    assert_eq!(call_main(&mut vm, "shout", Value::Str("hey")), Value::Str("HEY"));
    assert_eq!(call_main(&mut vm, "whisper", Value::Str("HEY")), Value::Str("hey"));

    let function = vm.function("main", "shout", 0).unwrap();
    let err = vm.call(function, Value::Int(1)).unwrap_err();
    assert!(matches!(
        &err.kind,
        ExecutionErrorKind::Schema { schema, message } if schema == "upper" && message == "not a string"
    ));

    let mut plain = Vm::new(&program, &registry, &values).unwrap();
    let function = plain.function("main", "shout", 0).unwrap();
    let err = plain.call(function, Value::Str("x")).unwrap_err();
    assert_eq!(err.kind, ExecutionErrorKind::MissingCodec);
}

#[test]
fn test_constants_and_effects() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    // base = 40; answer = base + 2; effect: (answer, pi)
    let constants = [
        b.constant_decl(
            "answer",
            b.call(b.global("main", "add"), b.tuple(&[b.constant("main", "base"), b.int(2)])),
        ),
        b.constant_decl("base", b.int(40)),
        b.native_constant("pi", "float.pi"),
    ];
    let effect = b.tuple(&[b.constant("main", "answer"), b.constant("main", "pi")]);
    let mut functions = natives(&b);
    functions.push(b.function("noop", b.lambda("x", b.local("x"))));
    let main = b.module("main", &[], &functions, &constants, &[effect]);
    let program = link(&[main], &SchemaTable::new());

    let order: Vec<String> = program.constant_order().map(|key| key.to_string()).collect();
    assert_eq!(order, ["main.base", "main.answer", "main.pi"]);

    let registry = stdlib::registry();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();
    assert_eq!(vm.constant("main", "answer"), Some(Value::Int(42)));
    assert_eq!(vm.effect_count(), 1);
    let result = vm.run_effect(0).unwrap();
    assert_eq!(
        result.as_tuple(),
        Some(&[Value::Int(42), Value::Float(core::f64::consts::PI)][..])
    );
}

#[test]
fn test_calling_a_non_function_fails() {
    let arena = Bump::new();
    let b = ExprBuilder::new(&arena);
    let program = link(&[main_module(&b, &[], &[])], &SchemaTable::new());
    let registry = NativeRegistry::builder().build();
    let values = Bump::new();
    let mut vm = Vm::new(&program, &registry, &values).unwrap();

    let err = vm.call(Value::Int(3), Value::Nil).unwrap_err();
    assert_eq!(err.kind, ExecutionErrorKind::NotCallable { found: "int" });
}
