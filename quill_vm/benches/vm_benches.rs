use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quill_core::{
  binary::{read_module, write_module, ReaderConfig},
  import::NoImports,
};
use quill_vm::{
  compiler::{
    ir::ast::{Ast, AstBuilder, BinaryOp},
    Compiler,
  },
  value::Value,
  vm::default_native_vm,
};
use std::io::Cursor;

/// fn fib(n) { if n < 2 { return n } return fib(n - 1) + fib(n - 2) }
fn fib_module() -> Ast {
  let mut b = AstBuilder::new();

  let n = b.param("n");
  let n_ref = b.id("n");
  let two = b.int(2);
  let cond = b.binary(BinaryOp::Less, n_ref, two);
  let n_ref = b.id("n");
  let early = b.ret(Some(n_ref));
  let then = b.block(vec![early]);
  let base = b.if_(cond, then, None);

  let recurse = |b: &mut AstBuilder, by: i64| {
    let fib = b.id("fib");
    let n_ref = b.id("n");
    let by = b.int(by);
    let arg = b.binary(BinaryOp::Subtract, n_ref, by);
    b.call(fib, vec![arg])
  };
  let left = recurse(&mut b, 1);
  let right = recurse(&mut b, 2);
  let sum = b.binary(BinaryOp::Add, left, right);
  let done = b.ret(Some(sum));

  let fib = b.method("fib", vec![n], vec![base, done]);
  b.module("bench", vec![fib])
}

fn criterion_benchmark(c: &mut Criterion) {
  let ast = fib_module();

  c.bench_with_input(BenchmarkId::new("compile", "fib"), &ast, |b, ast| {
    b.iter(|| Compiler::new(0usize, &NoImports).compile(ast.clone()));
  });

  let mut vm = default_native_vm();
  let module = vm.compile(ast.clone(), "").expect("Unable to compile benchmark.");

  let mut bytes = vec![];
  write_module(&module, &mut bytes).expect("Unable to write benchmark module.");
  c.bench_with_input(BenchmarkId::new("binary", "read"), &bytes, |b, bytes| {
    b.iter(|| read_module(&mut Cursor::new(bytes), ReaderConfig::default()));
  });

  vm.load(module);
  for n in [10, 20] {
    c.bench_with_input(BenchmarkId::new("execute", format!("fib{n}")), &n, |b, n| {
      b.iter(|| vm.call("bench", "fib", vec![Value::Int(black_box(*n))]));
    });
  }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
