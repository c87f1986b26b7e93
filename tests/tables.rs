//! Table access, construction, calls and generic `for`

mod common;

use common::*;
use lowlua::bytecode::{rk_as_k, Instruction, Literal, OpCode, Program, ProgramBuilder};
use lowlua::host::TValue;
use lowlua::jit::types::TAG_SHORT_STRING;

fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Instruction {
    Instruction::abc(op, a, b, c)
}

fn compile(program: &Program) -> (lowlua::JitCompiler, lowlua::CompiledFunction) {
    let mut compiler = compiler();
    let compiled = compiler.compile(program).expect("compile");
    (compiler, compiled)
}

/// `R(1) := R(0)[K(key)]; return R(1)`
fn gettable_program(key: Literal) -> Program {
    let mut b = ProgramBuilder::new("gettable");
    let k = b.add_constant(key);
    b.emit(abc(OpCode::GetTable, 1, 0, rk_as_k(k)));
    b.emit(abc(OpCode::Return, 1, 2, 0));
    b.build()
}

#[test]
fn test_gettable_hit_stays_inline() {
    let program = gettable_program(Literal::Integer(1));
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::new(&program);
    frame.set_register(0, new_table(&[(int(1), int(10))]));
    let out = frame.run(&compiled);
    assert_eq!(out.result_ints(), vec![Some(10)]);
    assert!(out.events.is_empty());
}

#[test]
fn test_gettable_miss_and_non_table_go_generic() {
    let program = gettable_program(Literal::Integer(2));
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::new(&program);
    frame.set_register(0, new_table(&[(int(1), int(10))]));
    let out = frame.run(&compiled);
    assert!(out.results[0].is_nil());
    assert_eq!(out.events, vec!["gettable"]);

    let mut frame = Frame::new(&program);
    frame.set_register(0, int(3));
    let out = frame.run(&compiled);
    assert_eq!(out.events, vec!["gettable"]);
    assert_eq!(out.errors.len(), 1);
}

#[test]
fn test_float_keys_go_generic() {
    // constant float key
    let program = gettable_program(Literal::Float(1.0));
    let (_c, compiled) = compile(&program);
    let mut frame = Frame::new(&program);
    frame.set_register(0, new_table(&[(float(1.0), int(10))]));
    let out = frame.run(&compiled);
    assert_eq!(out.result_ints(), vec![Some(10)]);
    assert_eq!(out.events, vec!["gettable"]);

    // register float key
    let mut b = ProgramBuilder::new("dynamic_key");
    b.max_stack_size(3);
    b.emit(abc(OpCode::GetTable, 2, 0, 1));
    b.emit(abc(OpCode::Return, 2, 2, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let table = new_table(&[(float(0.5), int(1)), (int(2), int(2))]);
    let mut frame = Frame::new(&program);
    frame.set_register(0, table);
    frame.set_register(1, float(0.5));
    let out = frame.run(&compiled);
    assert_eq!(out.result_ints(), vec![Some(1)]);
    assert_eq!(out.events, vec!["gettable"]);

    let mut frame = Frame::new(&program);
    frame.set_register(0, table);
    frame.set_register(1, int(2));
    let out = frame.run(&compiled);
    assert_eq!(out.result_ints(), vec![Some(2)]);
    assert!(out.events.is_empty());
}

#[test]
fn test_settable_existing_key_is_inline() {
    // R(0)[R(1)] := K(99)
    let mut b = ProgramBuilder::new("settable");
    let k = b.add_constant(Literal::Integer(99));
    b.emit(abc(OpCode::SetTable, 0, 1, rk_as_k(k)));
    b.emit(abc(OpCode::Return, 0, 1, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let table = new_table(&[(int(1), int(1))]);

    let mut frame = Frame::new(&program);
    frame.set_register(0, table);
    frame.set_register(1, int(1));
    let out = frame.run(&compiled);
    assert_eq!(out.events, vec!["barrierback"]);
    assert_eq!(table_get(&table, int(1)).as_integer(), Some(99));

    let mut frame = Frame::new(&program);
    frame.set_register(0, table);
    frame.set_register(1, int(5));
    let out = frame.run(&compiled);
    assert_eq!(out.events, vec!["settable"]);
    assert_eq!(table_get(&table, int(5)).as_integer(), Some(99));
}

#[test]
fn test_global_access_through_env_upvalue() {
    // x = x + 1 with x a global
    let mut b = ProgramBuilder::new("globals");
    b.upvalues(1);
    let name = b.add_constant(Literal::Object(TAG_SHORT_STRING));
    let one = b.add_constant(Literal::Integer(1));
    b.emit(abc(OpCode::GetTabUp, 0, 0, rk_as_k(name)));
    b.emit(abc(OpCode::Add, 0, 0, rk_as_k(one)));
    b.emit(abc(OpCode::SetTabUp, 0, rk_as_k(name), 0));
    b.emit(abc(OpCode::Return, 0, 1, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    // present: both accesses stay inline
    let env = new_table(&[]);
    let mut frame = Frame::builder(&program).upvalues(&[env]).build();
    let key = frame.constant(name);
    table_set(&env, key, int(41));
    let out = frame.run(&compiled);
    assert_eq!(out.events, vec!["barrierback"]);
    assert_eq!(table_get(&env, key).as_integer(), Some(42));

    // absent: the generic paths run and the store creates the slot
    let env = new_table(&[]);
    let mut frame = Frame::builder(&program).upvalues(&[env]).build();
    let out = frame.run(&compiled);
    assert_eq!(out.events, vec!["gettable", "arith add", "settable"]);
    assert_eq!(out.errors.len(), 1);
}

#[test]
fn test_self_loads_method_and_receiver() {
    let mut b = ProgramBuilder::new("self");
    b.max_stack_size(4);
    let name = b.add_constant(Literal::Object(TAG_SHORT_STRING));
    b.emit(abc(OpCode::SelfOp, 0, 2, rk_as_k(name)));
    b.emit(abc(OpCode::Return, 0, 3, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::new(&program);
    let method = host_fn(|_| Vec::new());
    let obj = new_table(&[]);
    table_set(&obj, frame.constant(name), method);
    frame.set_register(2, obj);
    let out = frame.run(&compiled);

    assert_eq!(out.results[0].as_gc(), method.as_gc());
    assert_eq!(out.results[1].as_gc(), obj.as_gc());
    assert_eq!(out.events, vec![format!("checkgc {}", frame.base() + 2)]);
}

#[test]
fn test_newtable_and_setlist() {
    let mut b = ProgramBuilder::new("list");
    b.max_stack_size(4);
    let ks: Vec<u32> = [10, 20, 30]
        .iter()
        .map(|&v| b.add_constant(Literal::Integer(v)))
        .collect();
    b.emit(abc(OpCode::NewTable, 0, 3, 0));
    for (i, k) in ks.iter().enumerate() {
        b.emit(Instruction::abx(OpCode::LoadK, i as u32 + 1, *k));
    }
    b.emit(abc(OpCode::SetList, 0, 3, 1));
    b.emit(abc(OpCode::Return, 0, 2, 0));
    let program = b.build();

    let out = run(&program);
    let table = out.results[0];
    assert_eq!(
        (1..=3).map(|i| table_get(&table, int(i)).as_integer()).collect::<Vec<_>>(),
        vec![Some(10), Some(20), Some(30)]
    );
    assert_eq!(out.events, vec!["newtable", "resize 3 0", "checkgc 2", "setlist 0 3"]);
}

#[test]
fn test_setlist_takes_open_count_from_vararg() {
    let mut b = ProgramBuilder::new("pack");
    b.vararg(true).max_stack_size(2);
    b.emit(abc(OpCode::NewTable, 0, 0, 0));
    b.emit(abc(OpCode::VarArg, 1, 0, 0));
    b.emit(abc(OpCode::SetList, 0, 0, 1));
    b.emit(abc(OpCode::Return, 0, 2, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::builder(&program)
        .varargs(&[int(4), int(5), int(6), int(7)])
        .build();
    let out = frame.run(&compiled);
    let table = out.results[0];
    assert_eq!(table_get(&table, int(4)).as_integer(), Some(7));
    assert!(out.events.contains(&"setlist 0 4".to_string()));
}

#[test]
fn test_setlist_with_extra_arg_block() {
    let mut b = ProgramBuilder::new("far_list");
    b.max_stack_size(3);
    b.emit(abc(OpCode::NewTable, 0, 0, 0));
    b.emit(abc(OpCode::SetList, 0, 2, 0));
    b.emit(Instruction::ax_only(OpCode::ExtraArg, 3));
    b.emit(abc(OpCode::Return, 0, 2, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::new(&program);
    frame.set_register(1, int(1));
    frame.set_register(2, int(2));
    let out = frame.run(&compiled);
    assert!(out.events.contains(&"setlist 100 2".to_string()));
    assert_eq!(table_get(&out.results[0], int(102)).as_integer(), Some(2));
}

fn add_all(args: &[TValue]) -> Vec<TValue> {
    vec![int(args.iter().filter_map(|v| v.as_integer()).sum())]
}

#[test]
fn test_call_with_fixed_results() {
    let mut b = ProgramBuilder::new("call");
    b.max_stack_size(4);
    b.emit(abc(OpCode::Call, 0, 3, 2));
    b.emit(abc(OpCode::Return, 0, 2, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::new(&program);
    frame.set_register(0, host_fn(add_all));
    frame.set_register(1, int(2));
    frame.set_register(2, int(3));
    let out = frame.run(&compiled);
    assert_eq!(out.result_ints(), vec![Some(5)]);
    assert_eq!(out.events, vec!["call 2 1"]);
}

#[test]
fn test_call_open_arguments() {
    // f(g()) where g returns three values
    let mut b = ProgramBuilder::new("nested_call");
    b.max_stack_size(4);
    b.emit(abc(OpCode::Call, 1, 1, 0));
    b.emit(abc(OpCode::Call, 0, 0, 2));
    b.emit(abc(OpCode::Return, 0, 2, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::new(&program);
    frame.set_register(0, host_fn(add_all));
    frame.set_register(1, host_fn(|_| vec![int(1), int(2), int(4)]));
    let out = frame.run(&compiled);
    assert_eq!(out.result_ints(), vec![Some(7)]);
    assert_eq!(out.events, vec!["call 0 -1", "call 3 1"]);
}

fn counter(args: &[TValue]) -> Vec<TValue> {
    match args.get(1).and_then(|v| v.as_integer()) {
        Some(n) if n < 3 => vec![int(n + 1), int((n + 1) * 10)],
        _ => vec![TValue::nil()],
    }
}

#[test]
fn test_generic_for() {
    let mut b = ProgramBuilder::new("pairs");
    b.max_stack_size(7);
    let zero = b.add_constant(Literal::Integer(0));
    b.emit(Instruction::abx(OpCode::LoadK, 6, zero));
    b.emit(Instruction::asbx(OpCode::Jmp, 0, 1));
    b.emit(abc(OpCode::Add, 6, 6, 4));
    b.emit(abc(OpCode::TForCall, 0, 0, 2));
    b.emit(Instruction::asbx(OpCode::TForLoop, 2, -3));
    b.emit(abc(OpCode::Return, 6, 2, 0));
    let program = b.build();
    let (_c, compiled) = compile(&program);

    let mut frame = Frame::new(&program);
    frame.set_register(0, host_fn(counter));
    frame.set_register(2, int(0));
    let out = frame.run(&compiled);
    assert_eq!(out.result_ints(), vec![Some(60)]);
    assert_eq!(out.count("call 2 2"), 4);
    assert_eq!(out.registers[2].as_integer(), Some(3));
}
