//! Aliasing and shadowing: shared records, shadowed bindings restoring
//! on scope exit, escapes, and the positions that keep a table alive.

use tablelint_ir::arena::Arena;
use tablelint_ir::diagnostics::WarningCode::{UndefinedFieldRead, UnusedFieldValue};
use tablelint_ir::item::BlockKind;
use tablelint_test_helpers::{analyze, assert_warnings, IrBuilder};

#[test]
fn test_alias_set_then_read_through_other_name() {
    // local x = {}
    // local y = x
    // y[1] = 2
    // print(x[1])
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.local_(&[b.name("y")], &[b.name("x")]));
    items.push(b.set(&[b.index(b.name("y"), b.num(1.0))], &[b.num(2.0)]));
    items.push(b.eval(b.call(
        b.global("print"),
        &[b.index(b.name("x"), b.num(1.0))],
    )));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_alias_read_then_set_symmetric() {
    // local x = {}
    // x[1] = 2
    // local y = x
    // print(y[1])
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.set(&[b.index(b.name("x"), b.num(1.0))], &[b.num(2.0)]));
    items.push(b.local_(&[b.name("y")], &[b.name("x")]));
    items.push(b.eval(b.call(
        b.global("print"),
        &[b.index(b.name("y"), b.num(1.0))],
    )));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_reassigning_alias_keeps_record_alive() {
    // local x = {}
    // x.a = 1
    // local y = x
    // x = {}          -- the record lives on through y
    // print(y.a)
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("x"), "a")], &[b.num(1.0)]));
    items.push(b.local_(&[b.name("y")], &[b.name("x")]));
    items.push(b.set(&[b.name("x")], &[b.table(&[])]));
    items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("y"), "a")])));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_self_assignment_is_inert() {
    // local x = {}
    // x.a = 1
    // x = x
    // print(x.a)
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("x"), "a")], &[b.num(1.0)]));
    items.push(b.set(&[b.name("x")], &[b.name("x")]));
    items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("x"), "a")])));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_shadowed_binding_restores_on_scope_exit() {
    // local x = {}
    // x.a = 1
    // do
    //   local x = 2      -- hides the table
    // end
    // print(x.a)         -- the table again
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("x"), "a")], &[b.num(1.0)]));
    items.push(b.open(BlockKind::Do));
    items.push(b.local_(&[b.name("x")], &[b.num(2.0)]));
    items.push(b.close(BlockKind::Do));
    items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("x"), "a")])));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_shadowing_with_alias_of_same_record() {
    // local x = {}
    // do
    //   local x = x      -- alias of the same table under the same name
    //   x.a = 1
    // end
    // print(x.a)
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.open(BlockKind::Do));
    items.push(b.local_(&[b.name("x")], &[b.name("x")]));
    items.push(b.set(&[b.field(b.name("x"), "a")], &[b.num(1.0)]));
    items.push(b.close(BlockKind::Do));
    items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("x"), "a")])));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_escape_through_return_value() {
    // local t = {}
    // t.a = 1
    // return t            -- lowered as Eval(t); Noop(Return)
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("t"), "a")], &[b.num(1.0)]));
    items.push(b.eval(b.name("t")));
    items.push(b.ret());
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_escape_into_global() {
    // local t = {}
    // t.a = 1
    // G = t
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("t"), "a")], &[b.num(1.0)]));
    items.push(b.set(&[b.global("G")], &[b.name("t")]));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_table_inside_literal_stays_alive() {
    // local t = {}
    // t.a = 1
    // local wrap = { t }   -- carried, not escaped
    // print(t.a)
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("t"), "a")], &[b.num(1.0)]));
    items.push(b.local_(&[b.name("wrap")], &[b.table(&[b.pos(b.name("t"))])]));
    items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("t"), "a")])));
    let line = b.line_scope(items);

    let warnings = analyze(&line, &b.interner());
    // t survives the literal; wrap's own key 1 is a table value and goes
    // unread.
    assert_warnings(&warnings, &[(UnusedFieldValue, "1")]);
}

#[test]
fn test_short_circuit_operand_stays_alive() {
    // local t = {}
    // t.a = 1
    // local u = t or fallback
    // print(t.a)
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("t"), "a")], &[b.num(1.0)]));
    items.push(b.local_(&[b.name("u")], &[b.or_(b.name("t"), b.global("fallback"))]));
    items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("t"), "a")])));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_concat_operand_escapes() {
    // local t = {}
    // t.a = 1
    // local s = "prefix" .. t
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.set(&[b.field(b.name("t"), "a")], &[b.num(1.0)]));
    items.push(b.local_(
        &[b.name("s")],
        &[b.binary(tablelint_ir::BinOp::Concat, b.str_("prefix"), b.name("t"))],
    ));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_method_call_receiver_becomes_imprecise() {
    // local t = {}
    // t:resize(4)
    // print(t.capacity)   -- method may have set anything
    // t.unused = 1        -- still tracked: a later method may read it
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.eval(b.invoke(b.name("t"), "resize", &[b.num(4.0)])));
    items.push(b.eval(b.call(
        b.global("print"),
        &[b.field(b.name("t"), "capacity")],
    )));
    items.push(b.set(&[b.field(b.name("t"), "unused")], &[b.num(1.0)]));
    let line = b.line_scope(items);

    let warnings = analyze(&line, &b.interner());
    // The receiver marker covers reads before the final set; the last
    // set still warns because nothing after it can observe it.
    assert_warnings(&warnings, &[(UnusedFieldValue, "unused")]);
}

#[test]
fn test_divergent_aliasing_gives_up() {
    // local x = {}
    // local y = {}
    // if c then y = x end
    // y[1] = 1
    // print(y[1])
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.local_(&[b.name("y")], &[b.table(&[])]));
    let cond = b.global("c");
    let body = vec![b.set(&[b.name("y")], &[b.name("x")])];
    items.extend(b.if_stmt(items.len(), vec![(cond, body)], None));
    items.push(b.set(&[b.index(b.name("y"), b.num(1.0))], &[b.num(1.0)]));
    items.push(b.eval(b.call(
        b.global("print"),
        &[b.index(b.name("y"), b.num(1.0))],
    )));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_branch_local_alias_merges_cleanly() {
    // local x = {}
    // if c then local y = x; y[1] = 1 end
    // print(x[1])
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    let cond = b.global("c");
    let body = vec![
        b.local_(&[b.name("y")], &[b.name("x")]),
        b.set(&[b.index(b.name("y"), b.num(1.0))], &[b.num(1.0)]),
    ];
    items.extend(b.if_stmt(items.len(), vec![(cond, body)], None));
    items.push(b.eval(b.call(
        b.global("print"),
        &[b.index(b.name("x"), b.num(1.0))],
    )));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_multi_assignment_alias_and_value() {
    // local x = {}
    // local y, n = x, 1
    // y.a = 2
    // print(x.a)
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("x")], &[b.table(&[])]));
    items.push(b.local_(&[b.name("y"), b.name("n")], &[b.name("x"), b.num(1.0)]));
    items.push(b.set(&[b.field(b.name("y"), "a")], &[b.num(2.0)]));
    items.push(b.eval(b.call(b.global("print"), &[b.field(b.name("x"), "a")])));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}

#[test]
fn test_imbalanced_assignment_pads_with_nil() {
    // local t = {}
    // t[1], t[2] = 1      -- t[2] receives nil
    // print(t[2])
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.set(
        &[
            b.index(b.name("t"), b.num(1.0)),
            b.index(b.name("t"), b.num(2.0)),
        ],
        &[b.num(1.0)],
    ));
    items.push(b.eval(b.call(
        b.global("print"),
        &[b.index(b.name("t"), b.num(2.0))],
    )));
    let line = b.line_scope(items);

    let warnings = analyze(&line, &b.interner());
    // t[1] is a real store that goes unread; t[2] reads back the nil.
    assert_warnings(
        &warnings,
        &[(UnusedFieldValue, "1"), (UndefinedFieldRead, "2")],
    );
}

#[test]
fn test_imbalanced_assignment_with_trailing_call() {
    // local t = {}
    // t[1], t[2] = f()    -- the call may return both values
    // print(t[2])
    let arena = Arena::new();
    let b = IrBuilder::new(&arena);
    let mut items = Vec::new();
    items.push(b.local_(&[b.name("t")], &[b.table(&[])]));
    items.push(b.set(
        &[
            b.index(b.name("t"), b.num(1.0)),
            b.index(b.name("t"), b.num(2.0)),
        ],
        &[b.call(b.global("f"), &[])],
    ));
    items.push(b.eval(b.call(
        b.global("print"),
        &[
            b.index(b.name("t"), b.num(1.0)),
            b.index(b.name("t"), b.num(2.0)),
        ],
    )));
    let line = b.line_scope(items);

    assert_warnings(&analyze(&line, &b.interner()), &[]);
}
