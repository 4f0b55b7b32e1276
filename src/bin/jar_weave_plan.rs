use std::env;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use tracing_subscriber::EnvFilter;
use zip::ZipArchive;

use aspectwerkz::expression::{Expression, ExpressionContext};
use aspectwerkz::loader::ClassLoader;
use aspectwerkz::reflect::{ClassInfo, ClassLookup};
use aspectwerkz::{AspectSystem, WeaverConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = WeaverConfig::from_env();
    let mut args: Vec<String> = env::args().skip(1).collect();
    let verbose = config.verbose || args.iter().any(|a| a == "--verbose");
    args.retain(|a| a != "--verbose");

    let default_level = if verbose { "aspectwerkz=debug" } else { "aspectwerkz=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let (jar_path, source) = match args.as_slice() {
        [jar] if config.definition_path.is_some() => (jar.clone(), None),
        [jar, expression] => (jar.clone(), Some(expression.clone())),
        _ => return Err("usage: jar_weave_plan [--verbose] JAR_PATH [EXPRESSION]".into()),
    };
    let expression = source.map(|s| Expression::compile_with(&s, &config.abbreviations)).transpose()?;

    let system = AspectSystem::new(config);
    let loader = ClassLoader::new("jar", None);
    let file = File::open(&jar_path)?;
    let mut zip = ZipArchive::new(file)?;
    let repository = system.repository(&loader);

    let mut class_files: u64 = 0;
    let mut failed: u64 = 0;
    let read_start = Instant::now();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if !entry.name().ends_with(".class") {
            continue;
        }
        class_files += 1;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        match ClassInfo::from_class_bytes(&bytes) {
            Ok(info) => {
                repository.insert(info);
            }
            Err(err) => {
                failed += 1;
                tracing::debug!(entry = entry.name(), error = %err, "skipping unreadable class file");
            }
        }
    }
    let read_time = read_start.elapsed();

    let definitions = system.load_configured_definitions(&loader)?;
    let mut managers = Vec::with_capacity(definitions.len());
    for definition in &definitions {
        managers.push(system.aspect_manager(&loader, definition.id())?);
    }

    let lookup = system.lookup_for(&loader);
    let lookup: &dyn ClassLookup = lookup.as_ref();
    let mut join_points: u64 = 0;
    let mut advised: u64 = 0;
    let mut matched: u64 = 0;
    let mut undecided: u64 = 0;
    let match_start = Instant::now();
    for name in repository.class_names() {
        let Some(class) = repository.get(&name) else { continue };
        let contexts = class
            .methods
            .iter()
            .map(|m| ExpressionContext::execution(Arc::clone(m)))
            .chain(class.constructors.iter().map(|c| ExpressionContext::constructor_execution(Arc::clone(c))));
        for ctx in contexts {
            let ctx = ctx?;
            join_points += 1;
            for manager in &managers {
                let plan = manager.weave_plan(&ctx)?;
                if !plan.is_empty() {
                    advised += 1;
                    println!("advise {} {ctx} advices={}", manager.definition().id(), plan.len());
                }
            }
            let Some(expression) = &expression else { continue };
            match expression.may_match(&ctx, Some(lookup))? {
                aspectwerkz::expression::Tri::True => {
                    matched += 1;
                    println!("match {ctx}");
                }
                aspectwerkz::expression::Tri::Maybe => {
                    undecided += 1;
                    println!("maybe {ctx}");
                }
                aspectwerkz::expression::Tri::False => {}
            }
        }
    }
    let match_time = match_start.elapsed();

    println!("jar_path={}", jar_path);
    if let Some(expression) = &expression {
        println!("expression={}", expression);
    }
    println!("systems={} advised={}", definitions.len(), advised);
    println!("class_files={} failed={}", class_files, failed);
    println!("join_points={}", join_points);
    println!("matched={} runtime_checked={}", matched, undecided);
    println!("read_time_ms={:.3}", read_time.as_secs_f64() * 1000.0);
    println!("match_time_ms={:.3}", match_time.as_secs_f64() * 1000.0);

    Ok(())
}
