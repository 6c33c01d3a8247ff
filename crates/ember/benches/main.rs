use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use ember::{compile, Vm};

fn new_vm() -> Vm {
    Vm::new(std::io::empty(), std::io::sink(), std::io::sink())
}

/// Compiles once, then benchmarks repeated execution in one VM.
fn run_ember(bench: &mut Bencher, source: &str, expected: i64) {
    let code = compile(source).unwrap();
    let mut vm = new_vm();
    let value = vm.execute(&code).unwrap();
    assert_eq!(value.as_int(), Some(expected));

    bench.iter(|| {
        let value = vm.execute(&code).unwrap();
        black_box(value);
    });
}

const ADD_TWO: &str = "1 + 2";

const ARRAY_APPEND: &str = "
a = []
a.append(42)
a[0]
";

const LOOP_MOD_13: &str = "
v = ''
for i in range(1000)
  if i % 13 == 0
    v += 'x'
  end
end
len(v)
";

const ARRAY_APPEND_INT: &str = "
a = []
for i in range(100000)
  a.append(i)
end
sum(a)
";

const WHILE_SUM: &str = "
i = 0
total = 0
while i < 100000
  total += i
  i += 1
end
total
";

const FIB_25: &str = "
def fib(n)
  if n <= 1
    return n
  end
  return fib(n - 1) + fib(n - 2)
end
fib(25)
";

const GENERATOR_SUM: &str = "
def squares(n)
  for i in range(n)
    yield i * i
  end
end
sum(squares(10000))
";

const HASH_COUNT: &str = "
counts = {}
for i in range(10000)
  key = i % 100
  counts[key] = counts.get(key, 0) + 1
end
len(counts)
";

const METHOD_CALLS: &str = "
class Counter
  def __init__()
    self.n = 0
  end
  def bump()
    self.n += 1
  end
end
c = Counter()
for _ in range(10000)
  c.bump()
end
c.n
";

/// Parsing and compiling are inside the loop.
fn end_to_end(bench: &mut Bencher) {
    let mut vm = new_vm();
    bench.iter(|| {
        let value = vm.execute_string(black_box("1 + 2")).unwrap();
        black_box(value);
    });
}

fn compile_only(bench: &mut Bencher) {
    bench.iter(|| {
        let code = compile(black_box(FIB_25)).unwrap();
        black_box(code);
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("add_two", |b| run_ember(b, ADD_TWO, 3));
    c.bench_function("array_append", |b| run_ember(b, ARRAY_APPEND, 42));
    c.bench_function("loop_mod_13", |b| run_ember(b, LOOP_MOD_13, 77));
    c.bench_function("array_append_int", |b| run_ember(b, ARRAY_APPEND_INT, 4_999_950_000));
    c.bench_function("while_sum", |b| run_ember(b, WHILE_SUM, 4_999_950_000));
    c.bench_function("fib", |b| run_ember(b, FIB_25, 75_025));
    c.bench_function("generator_sum", |b| run_ember(b, GENERATOR_SUM, 333_283_335_000));
    c.bench_function("hash_count", |b| run_ember(b, HASH_COUNT, 100));
    c.bench_function("method_calls", |b| run_ember(b, METHOD_CALLS, 10_000));
    c.bench_function("end_to_end", end_to_end);
    c.bench_function("compile", compile_only);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
