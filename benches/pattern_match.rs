use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use aspectwerkz::expression::{Expression, ExpressionContext};
use aspectwerkz::pattern::MethodPattern;
use aspectwerkz::reflect::{ClassInfo, ClassInfoRepository, ClassLookup, MethodInfo};

fn build_repository() -> ClassInfoRepository {
    let repository = ClassInfoRepository::new();
    repository.insert(ClassInfo::new("java.lang.Object"));
    repository.insert(ClassInfo::interface("bench.Service"));
    repository.insert(
        ClassInfo::new("bench.AbstractService")
            .extends("java.lang.Object")
            .implements("bench.Service"),
    );
    for i in 0..32 {
        let mut class = ClassInfo::new(format!("bench.impl.OrderService{i}")).extends("bench.AbstractService");
        for m in 0..8 {
            class = class.with_method(
                MethodInfo::new("", format!("handle{m}"))
                    .returning("int")
                    .with_parameters(["java.lang.String", "int", "long"]),
            );
        }
        repository.insert(class);
    }
    repository
}

fn utf8(bytes: &mut Vec<u8>, text: &str) {
    bytes.push(1);
    bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
    bytes.extend_from_slice(text.as_bytes());
}

fn build_job_class() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xCAFEBABE_u32.to_be_bytes());
    bytes.extend_from_slice(&0_u16.to_be_bytes());
    bytes.extend_from_slice(&52_u16.to_be_bytes());

    // constant pool count = 7
    bytes.extend_from_slice(&7_u16.to_be_bytes());
    utf8(&mut bytes, "bench/Job");
    utf8(&mut bytes, "java/lang/Object");
    bytes.push(7);
    bytes.extend_from_slice(&1_u16.to_be_bytes());
    bytes.push(7);
    bytes.extend_from_slice(&2_u16.to_be_bytes());
    utf8(&mut bytes, "run");
    utf8(&mut bytes, "(Ljava/lang/String;I)J");

    // access_flags, this_class, super_class
    bytes.extend_from_slice(&0x0021_u16.to_be_bytes());
    bytes.extend_from_slice(&3_u16.to_be_bytes());
    bytes.extend_from_slice(&4_u16.to_be_bytes());

    // interfaces, fields
    bytes.extend_from_slice(&0_u16.to_be_bytes());
    bytes.extend_from_slice(&0_u16.to_be_bytes());

    // one public method, no attributes
    bytes.extend_from_slice(&1_u16.to_be_bytes());
    bytes.extend_from_slice(&0x0001_u16.to_be_bytes());
    bytes.extend_from_slice(&5_u16.to_be_bytes());
    bytes.extend_from_slice(&6_u16.to_be_bytes());
    bytes.extend_from_slice(&0_u16.to_be_bytes());

    // class attributes
    bytes.extend_from_slice(&0_u16.to_be_bytes());
    bytes
}

fn sample_method() -> Arc<MethodInfo> {
    Arc::new(
        MethodInfo::new("bench.impl.OrderService7", "handle3")
            .returning("int")
            .with_parameters(["java.lang.String", "int", "long"]),
    )
}

fn bench_method_pattern(c: &mut Criterion) {
    let pattern = MethodPattern::compile("int bench..*Service*.handle*(String, ..)").unwrap();
    let method = sample_method();
    c.bench_function("method_pattern_match", |b| {
        b.iter(|| {
            let _ = pattern.matches(&method).unwrap();
        })
    });
}

fn bench_expression(c: &mut Criterion) {
    let repository = build_repository();
    let lookup: &dyn ClassLookup = &repository;
    let expression = Expression::compile(
        "execution(* bench.Service+.handle*(..)) && within(bench..*) && !execution(* *.toString())",
    )
    .unwrap();
    let ctx = ExpressionContext::execution(sample_method()).unwrap();
    c.bench_function("expression_may_match_hierarchical", |b| {
        b.iter(|| {
            let _ = expression.may_match(&ctx, Some(lookup)).unwrap();
        })
    });
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("expression_compile", |b| {
        b.iter(|| {
            let _ = Expression::compile("execution(* foo..*.*(..)) || call(void foo.Bar.baz(int, String))").unwrap();
        })
    });
}

fn bench_class_bytes(c: &mut Criterion) {
    let bytes = build_job_class();
    c.bench_function("class_bytes_to_metadata", |b| {
        b.iter(|| {
            let _ = ClassInfo::from_class_bytes(&bytes).unwrap();
        })
    });
}

criterion_group!(benches, bench_method_pattern, bench_expression, bench_compile, bench_class_bytes);
criterion_main!(benches);
