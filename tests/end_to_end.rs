mod common;

use common::{compile, compile_with, entry, in_main, reject};
use fanc::{
    parse::ParserError,
    semantic::{Options, SemanticError, Type},
};

fn assert_patched(ir: &str) {
    assert!(!ir.contains("label @"), "Unresolved jump target in:\n{}", ir);
}

#[test]
fn byte_literal_overflow() {
    let failure = reject(&in_main("byte b = 300b;"));
    assert!(matches!(failure.semantic(), Some(SemanticError::OutOfRange(300))));

    let failure = reject(&in_main("byte b = 300;"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::ExpectedType(Type::Byte, Type::Int))
    ));

    let failure = reject(&in_main("byte b = (byte) 256;"));
    assert!(matches!(failure.semantic(), Some(SemanticError::OutOfRange(256))));
}

#[test]
fn if_else_reconverges_once() -> anyhow::Result<()> {
    let ir = compile(&in_main("int x; x = 5; if (x > 3) x = 1; else x = 2;"))?;

    let expected = entry(2)
        + "define void @main_2() {\n\
           \x20   %var_0 = alloca i32, i32 50\n\
           \x20   %var_1 = getelementptr i32, i32* %var_0, i32 0\n\
           \x20   store i32 0, i32* %var_1\n\
           \x20   %var_2 = getelementptr i32, i32* %var_0, i32 0\n\
           \x20   store i32 5, i32* %var_2\n\
           \x20   %var_3 = getelementptr i32, i32* %var_0, i32 0\n\
           \x20   %var_4 = load i32, i32* %var_3\n\
           \x20   %var_5 = icmp sgt i32 %var_4, 3\n\
           \x20   br i1 %var_5, label %label_10, label %label_14\n\
           label_10:\n\
           \x20   %var_6 = getelementptr i32, i32* %var_0, i32 0\n\
           \x20   store i32 1, i32* %var_6\n\
           \x20   br label %label_18\n\
           label_14:\n\
           \x20   %var_7 = getelementptr i32, i32* %var_0, i32 0\n\
           \x20   store i32 2, i32* %var_7\n\
           \x20   br label %label_18\n\
           label_18:\n\
           \x20   ret void\n\
           }\n";

    assert_eq!(ir, expected);
    Ok(())
}

#[test]
fn if_else_allocates_a_single_offset() {
    let output = compile_with(
        &in_main("int x; x = 5; if (x > 3) x = 1; else x = 2;"),
        Options::DUMP_SCOPES,
    )
    .unwrap();

    assert_eq!(
        output.listing(),
        "---end scope---\n\
         ---end scope---\n\
         ---end scope---\n\
         x INT 0\n\
         ---end scope---\n\
         print (STRING)->VOID 0\n\
         printi (INT)->VOID 0\n\
         main ()->VOID 0\n"
    );
}

#[test]
fn break_targets_the_loop_exit() -> anyhow::Result<()> {
    let ir = compile(&in_main("while (true) { break; }"))?;

    let expected = entry(2)
        + "define void @main_2() {\n\
           \x20   %var_0 = alloca i32, i32 50\n\
           \x20   br label %label_3\n\
           label_3:\n\
           \x20   br label %label_5\n\
           label_5:\n\
           \x20   br label %label_8\n\
           \x20   br label %label_3\n\
           label_8:\n\
           \x20   ret void\n\
           }\n";

    assert_eq!(ir, expected);
    Ok(())
}

#[test]
fn override_requires_an_overridable_original() {
    let failure = reject("void f(int a) {}\noverride void f(int a) {}\nvoid main() {}\n");
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::MissingOverrideKeyword(name)) if name.as_ref() == "f"
    ));

    let failure = reject("override void f(int a) {}\nvoid f(byte b) {}\nvoid main() {}\n");
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::SpuriousOverrideKeyword(_))
    ));

    let failure = reject("override void f(int a) {}\noverride void f(int b) {}\nvoid main() {}\n");
    assert!(matches!(failure.semantic(), Some(SemanticError::Redefined(_))));

    let failure = reject("void f() {}\nvoid f() {}\nvoid main() {}\n");
    assert!(matches!(failure.semantic(), Some(SemanticError::Redefined(_))));

    let failure = reject("override void main() {}\n");
    assert!(matches!(failure.semantic(), Some(SemanticError::MainOverride)));
}

#[test]
fn overloads_resolve_by_argument_types() -> anyhow::Result<()> {
    let program = "override void show(int value) { printi(value); }\n\
                   override void show(bool value) { if (value) print(\"yes\"); }\n\
                   void main() { show(3); show(1 < 2); }\n";

    let ir = compile(program)?;
    assert!(ir.contains("define void @show_2(i32) {"));
    assert!(ir.contains("define void @show_3(i32) {"));
    assert!(ir.contains("call void @show_2(i32 3)"));
    assert!(ir.contains("call void @show_3(i32 %var_"));
    assert_patched(&ir);

    Ok(())
}

#[test]
fn widening_makes_calls_ambiguous() {
    let program = "override void g(int a) {}\n\
                   override void g(byte b) {}\n\
                   void main() { g(1b); }\n";

    let failure = reject(program);
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::AmbiguousCall(_, types)) if types.0 == vec![Type::Byte]
    ));

    let failure = reject(&in_main("printi(\"text\");"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::PrototypeMismatch(..))
    ));

    let failure = reject(&in_main("int x; x();"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::UndefinedFunction(_))
    ));
}

#[test]
fn entrypoint_must_be_void_main() {
    for program in [
        "void f() {}\n",
        "int main() { return 0; }\n",
        "void main(int argc) {}\n",
    ] {
        let failure = reject(program);
        assert!(matches!(failure.semantic(), Some(SemanticError::NoMain)));
    }
}

#[test]
fn loop_context() {
    let failure = reject(&in_main("break;"));
    assert!(matches!(failure.semantic(), Some(SemanticError::UnexpectedBreak)));

    let failure = reject(&in_main("if (true) { continue; }"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::UnexpectedContinue)
    ));
}

#[test]
fn names_and_types() {
    let failure = reject(&in_main("x = 1;"));
    assert!(matches!(failure.semantic(), Some(SemanticError::Undefined(_))));

    let failure = reject(&in_main("print = 3;"));
    assert!(matches!(failure.semantic(), Some(SemanticError::NotAVariable(_))));

    let failure = reject(&in_main("int x; { int x; }"));
    assert!(matches!(failure.semantic(), Some(SemanticError::Redeclared(_))));

    let failure = reject("void f(int a) { int a; }\nvoid main() {}\n");
    assert!(matches!(failure.semantic(), Some(SemanticError::Redeclared(_))));

    let failure = reject(&in_main("int x = true;"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::ExpectedType(Type::Int, Type::Bool))
    ));

    let failure = reject(&in_main("int x = 1 + (2 < 3);"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::ExpectedNumeric(Type::Bool))
    ));

    let failure = reject(&in_main("if (1) printi(1);"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::ExpectedType(Type::Bool, Type::Int))
    ));

    let failure = reject(&in_main("bool b = (bool) 1;"));
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::BadCast(Type::Int, Type::Bool))
    ));

    let failure = reject("int f() { return; }\nvoid main() {}\n");
    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::ExpectedType(Type::Int, Type::Void))
    ));
}

#[test]
fn short_circuit_materialization() -> anyhow::Result<()> {
    let ir = compile(&in_main("bool b = true and false;"))?;

    let expected = entry(2)
        + "define void @main_2() {\n\
           \x20   %var_0 = alloca i32, i32 50\n\
           \x20   br label %label_3\n\
           label_3:\n\
           \x20   br label %label_7\n\
           label_5:\n\
           \x20   br label %label_9\n\
           label_7:\n\
           \x20   br label %label_9\n\
           label_9:\n\
           \x20   %var_1 = phi i32 [ 1, %label_5 ], [ 0, %label_7 ]\n\
           \x20   %var_2 = getelementptr i32, i32* %var_0, i32 0\n\
           \x20   store i32 %var_1, i32* %var_2\n\
           \x20   ret void\n\
           }\n";

    assert_eq!(ir, expected);
    Ok(())
}

#[test]
fn negation_swaps_targets() -> anyhow::Result<()> {
    let ir = compile(&in_main("if (not (1 > 2)) printi(1);"))?;

    assert!(ir.contains("    %var_1 = icmp sgt i32 1, 2\n    br i1 %var_1, label %label_7, label %label_4\n"));
    assert!(ir.contains("label_4:\n    call void @printi(i32 1)\n    br label %label_7\nlabel_7:\n"));

    Ok(())
}

#[test]
fn division_is_guarded() -> anyhow::Result<()> {
    let ir = compile(&in_main("int x = 6 / 2;"))?;
    assert!(ir.contains("    call void @check_division(i32 2)\n    %var_1 = sdiv i32 6, 2\n"));

    let ir = compile(&in_main("byte b = 6b / 2b;"))?;
    assert!(ir.contains(
        "    call void @check_division(i32 2)\n\
         \x20   %var_1 = udiv i32 6, 2\n\
         \x20   %var_2 = and i32 %var_1, 255\n"
    ));

    Ok(())
}

#[test]
fn parameters_and_calls() -> anyhow::Result<()> {
    let program = "int add(int a, byte b) { return a + b; }\n\
                   void main() { printi(add(1, 2b)); }\n";

    let ir = compile(program)?;
    assert!(ir.starts_with(&entry(3)));
    assert!(ir.contains("define i32 @add_2(i32, i32) {\n    %var_0 = alloca i32, i32 52\n"));
    assert!(ir.contains("call i32 @add_2(i32 1, i32 2)"));
    assert!(ir.contains("ret i32 %var_"));

    Ok(())
}

#[test]
fn parameters_are_assignable() -> anyhow::Result<()> {
    let program = "int twice(int n) { n = n * 2; return n; }\nvoid main() {}\n";
    let ir = compile(program)?;

    assert!(ir.contains("getelementptr i32, i32* %var_2, i32 -1"));
    assert!(ir.contains("mul i32"));

    Ok(())
}

#[test]
fn string_literals() -> anyhow::Result<()> {
    let ir = compile(&in_main("print(\"hi\");"))?;

    assert!(ir.starts_with("@.str_1 = private constant [3 x i8] c\"hi\\00\"\n"));
    assert!(ir.contains(
        "    call void @print(i8* getelementptr ([3 x i8], [3 x i8]* @.str_1, i32 0, i32 0))\n"
    ));

    Ok(())
}

#[test]
fn boolean_functions_return_values() -> anyhow::Result<()> {
    let program = "bool positive(int n) { return n > 0; }\n\
                   void g() {}\n\
                   void h() { return g(); }\n\
                   void main() { bool p = positive(3) or false; if (p) h(); }\n";

    let ir = compile(program)?;
    assert!(ir.contains("phi i32 [ 1, %label_"));
    assert!(ir.contains("call i32 @positive_2(i32 3)"));
    assert!(ir.contains("call void @g_3()\n    ret void\n"));
    assert_patched(&ir);

    Ok(())
}

#[test]
fn missing_return_yields_a_default() -> anyhow::Result<()> {
    let ir = compile("int f() { }\nvoid main() {}\n")?;
    assert!(ir.contains("define i32 @f_2() {\n    %var_0 = alloca i32, i32 50\n    ret i32 0\n}\n"));

    Ok(())
}

#[test]
fn loops_with_continue() -> anyhow::Result<()> {
    let ir = compile(&in_main(
        "int i = 0;\n\
         while (i < 10 and not (i == 5)) {\n\
             i = i + 1;\n\
             if (i == 3) continue;\n\
             printi(i);\n\
         }",
    ))?;

    assert!(ir.contains("icmp slt i32"));
    assert!(ir.contains("icmp eq i32"));
    assert_patched(&ir);

    Ok(())
}

#[test]
fn offsets_grow_across_closed_blocks() {
    let output = compile_with(
        "void f() { int a; { int b; } int c; }\nvoid main() { int z; }\n",
        Options::DUMP_SCOPES,
    )
    .unwrap();

    assert_eq!(
        output.listing(),
        "---end scope---\n\
         b INT 1\n\
         ---end scope---\n\
         a INT 0\n\
         c INT 2\n\
         ---end scope---\n\
         z INT 0\n\
         ---end scope---\n\
         print (STRING)->VOID 0\n\
         printi (INT)->VOID 0\n\
         f ()->VOID 0\n\
         main ()->VOID 0\n"
    );
}

#[test]
fn frame_capacity() {
    let declarations: String = (0..51).map(|i| format!("int v{};\n", i)).collect();
    let failure = reject(&in_main(&declarations));

    assert!(matches!(
        failure.semantic(),
        Some(SemanticError::FrameExhausted(50))
    ));
}

#[test]
fn syntax_errors() {
    let failure = reject(&in_main("int x = ;"));
    assert!(matches!(failure.syntax(), Some(ParserError::ExpectedExpr(_))));

    let failure = reject("void main() {\n");
    assert!(matches!(failure.syntax(), Some(ParserError::UnexpectedEof)));

    let failure = reject("void main() { int x = 1 }");
    assert!(matches!(failure.syntax(), Some(ParserError::UnexpectedToken(..))));
}

#[test]
fn lexical_errors() {
    let failure = reject("void main() { int x = 1 $ 2; }");
    assert!(failure.semantic().is_none() && failure.syntax().is_none());
}

#[test]
fn output_is_deterministic() -> anyhow::Result<()> {
    let program = in_main("int i = 0; while (i < 3) { printi(i); i = i + 1; }");
    assert_eq!(compile(&program)?, compile(&program)?);

    Ok(())
}

#[test]
fn embedded_runtime_defines_helpers() {
    for helper in ["@print(i8*)", "@printi(i32)", "@check_division(i32)"] {
        assert!(fanc::RUNTIME.contains(&format!("define void {}", helper)));
    }
}
