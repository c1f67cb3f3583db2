//! Demo pipeline-dump binary (§4.7).
//!
//! Plays the same ergonomic role the teacher's `aethc` binary plays for
//! the whole compiler, scaled down to this crate's slice: build one of
//! a few fixture programs, run it through lowering/mem2reg/de-SSA, and
//! print the IR at whichever stage was asked for. It deliberately does
//! not read source files or invoke a parser/checker — those are this
//! mid-end's external collaborators, not something this binary stands
//! up itself.

use clap::Parser;

use kei_midend::ast::{self, BinOp, Block, Expr, ExprId, ExprKind, Ident, Item, Literal, Param, Stmt, Type};
use kei_midend::checker::CheckResult;
use kei_midend::ir::IrType;
use kei_midend::settings::IrDumpMode;
use kei_midend::utils::Span;
use kei_midend::{printer, run_pipeline};

#[derive(Parser, Debug)]
#[command(name = "keic-mid-dump", about = "Dump Kei mid-end IR for a built-in fixture program")]
struct Cli {
    /// Which built-in fixture to lower: add, max, sum
    #[arg(long, default_value = "sum")]
    fixture: String,

    /// Which pipeline stage to print: pre-mem2reg, ssa, final
    #[arg(long, default_value = "final")]
    dump_mode: IrDumpMode,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let (program, check) = match cli.fixture.as_str() {
        "add" => fixtures::add(),
        "max" => fixtures::max(),
        "sum" => fixtures::sum(),
        other => {
            eprintln!("unknown fixture `{other}` (expected add, max, or sum)");
            std::process::exit(1);
        }
    };

    let settings = cli.dump_mode.settings();
    match run_pipeline(&program, &check, &cli.fixture, settings) {
        Ok(module) => print!("{}", printer::print_module(&module)),
        Err(err) => {
            eprintln!("pipeline failed: {err:#}");
            std::process::exit(1);
        }
    }
}

/// A handful of small, hand-built typed ASTs standing in for what a
/// real frontend+checker would hand this crate. Every expression that
/// `lower_let` reads a type for is registered in the paired
/// `CheckResult`; everything else is left to the lowerer's documented
/// defaults.
mod fixtures {
    use super::*;

    struct IdGen(u32);
    impl IdGen {
        fn next(&mut self) -> ExprId {
            let id = ExprId(self.0);
            self.0 += 1;
            id
        }
    }

    fn ident(name: &str) -> Ident {
        Ident { name: name.to_string(), span: Span::dummy() }
    }

    fn named_ty(name: &str) -> Type {
        Type::Named(name.to_string(), Span::dummy())
    }

    fn expr(id: ExprId, kind: ExprKind) -> Expr {
        Expr { id, kind, span: Span::dummy() }
    }

    fn param(name: &str, ty: &str) -> Param {
        Param { name: ident(name), ownership: ast::Ownership::Own, ty: named_ty(ty), span: Span::dummy() }
    }

    fn block(stmts: Vec<Stmt>) -> Block {
        Block { stmts, span: Span::dummy() }
    }

    /// `fn add(a: i32, b: i32): i32 { return a + b }`
    ///
    /// No lets, no branches: exercises plain expression lowering and
    /// shows mem2reg/de-SSA as no-ops (no allocas, no phis).
    pub fn add() -> (ast::Program, CheckResult) {
        let mut ids = IdGen(0);
        let a = expr(ids.next(), ExprKind::Ident(ident("a")));
        let b = expr(ids.next(), ExprKind::Ident(ident("b")));
        let sum = expr(ids.next(), ExprKind::Binary { left: Box::new(a), op: BinOp::Add, right: Box::new(b) });

        let body = block(vec![Stmt::Return { value: Some(sum), span: Span::dummy() }]);

        let func = ast::Function {
            name: ident("add"),
            params: vec![param("a", "i32"), param("b", "i32")],
            ret_type: Some(named_ty("i32")),
            throws: vec![],
            body,
            span: Span::dummy(),
        };

        (ast::Program { items: vec![Item::Function(func)] }, CheckResult::default())
    }

    /// ```text
    /// fn max(a: i32, b: i32): i32 {
    ///     let m = a
    ///     if b > a {
    ///         m = b
    ///     }
    ///     return m
    /// }
    /// ```
    ///
    /// One alloca promoted to a single-predecessor phi after mem2reg
    /// (the spec's diamond-with-no-else shape), then a same-type `cast`
    /// copy reintroduced at the end of each predecessor by de-SSA.
    pub fn max() -> (ast::Program, CheckResult) {
        let mut ids = IdGen(0);
        let mut check = CheckResult::default();

        let let_value = expr(ids.next(), ExprKind::Ident(ident("a")));
        check.expr_types.insert(let_value.id, IrType::i32());
        let let_stmt = Stmt::Let { name: ident("m"), ty: None, value: let_value, span: Span::dummy() };

        let cond_b = expr(ids.next(), ExprKind::Ident(ident("b")));
        let cond_a = expr(ids.next(), ExprKind::Ident(ident("a")));
        let cond = expr(ids.next(), ExprKind::Binary { left: Box::new(cond_b), op: BinOp::Gt, right: Box::new(cond_a) });

        let assign_target = expr(ids.next(), ExprKind::Ident(ident("m")));
        let assign_value = expr(ids.next(), ExprKind::Ident(ident("b")));
        let assign = expr(ids.next(), ExprKind::Assign { target: Box::new(assign_target), op: None, value: Box::new(assign_value) });
        let then_block = block(vec![Stmt::Expr(assign)]);

        let if_expr = expr(ids.next(), ExprKind::If { cond: Box::new(cond), then_block, else_block: None });

        let ret_m = expr(ids.next(), ExprKind::Ident(ident("m")));

        let body = block(vec![let_stmt, Stmt::Expr(if_expr), Stmt::Return { value: Some(ret_m), span: Span::dummy() }]);

        let func = ast::Function {
            name: ident("max"),
            params: vec![param("a", "i32"), param("b", "i32")],
            ret_type: Some(named_ty("i32")),
            throws: vec![],
            body,
            span: Span::dummy(),
        };

        (ast::Program { items: vec![Item::Function(func)] }, check)
    }

    /// ```text
    /// fn sum(n: i32): i32 {
    ///     let total = 0
    ///     let i = 0
    ///     while i < n {
    ///         total = total + i
    ///         i = i + 1
    ///     }
    ///     return total
    /// }
    /// ```
    ///
    /// Two allocas live across a loop back edge: mem2reg inserts two
    /// phis at the loop header and de-SSA sequences their back-edge
    /// copies as an ordered (non-interfering) chain.
    pub fn sum() -> (ast::Program, CheckResult) {
        let mut ids = IdGen(0);
        let mut check = CheckResult::default();

        let zero_total = expr(ids.next(), ExprKind::Literal(Literal::Int(0, Span::dummy())));
        check.expr_types.insert(zero_total.id, IrType::i32());
        let let_total = Stmt::Let { name: ident("total"), ty: None, value: zero_total, span: Span::dummy() };

        let zero_i = expr(ids.next(), ExprKind::Literal(Literal::Int(0, Span::dummy())));
        check.expr_types.insert(zero_i.id, IrType::i32());
        let let_i = Stmt::Let { name: ident("i"), ty: None, value: zero_i, span: Span::dummy() };

        let cond_i = expr(ids.next(), ExprKind::Ident(ident("i")));
        let cond_n = expr(ids.next(), ExprKind::Ident(ident("n")));
        let cond = expr(ids.next(), ExprKind::Binary { left: Box::new(cond_i), op: BinOp::Lt, right: Box::new(cond_n) });

        let total_target = expr(ids.next(), ExprKind::Ident(ident("total")));
        let total_lhs = expr(ids.next(), ExprKind::Ident(ident("total")));
        let total_rhs = expr(ids.next(), ExprKind::Ident(ident("i")));
        let total_sum = expr(ids.next(), ExprKind::Binary { left: Box::new(total_lhs), op: BinOp::Add, right: Box::new(total_rhs) });
        let assign_total = expr(ids.next(), ExprKind::Assign { target: Box::new(total_target), op: None, value: Box::new(total_sum) });

        let i_target = expr(ids.next(), ExprKind::Ident(ident("i")));
        let i_lhs = expr(ids.next(), ExprKind::Ident(ident("i")));
        let one = expr(ids.next(), ExprKind::Literal(Literal::Int(1, Span::dummy())));
        check.expr_types.insert(one.id, IrType::i32());
        let i_next = expr(ids.next(), ExprKind::Binary { left: Box::new(i_lhs), op: BinOp::Add, right: Box::new(one) });
        let assign_i = expr(ids.next(), ExprKind::Assign { target: Box::new(i_target), op: None, value: Box::new(i_next) });

        let body = block(vec![Stmt::Expr(assign_total), Stmt::Expr(assign_i)]);
        let while_expr = expr(ids.next(), ExprKind::While { cond: Box::new(cond), body });

        let ret_total = expr(ids.next(), ExprKind::Ident(ident("total")));

        let fn_body = block(vec![let_total, let_i, Stmt::Expr(while_expr), Stmt::Return { value: Some(ret_total), span: Span::dummy() }]);

        let func = ast::Function {
            name: ident("sum"),
            params: vec![param("n", "i32")],
            ret_type: Some(named_ty("i32")),
            throws: vec![],
            body: fn_body,
            span: Span::dummy(),
        };

        (ast::Program { items: vec![Item::Function(func)] }, check)
    }
}
