use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tinyrv_sim::sim_env::{SimConfig, SimEnv, TestResult};

const SUFFIX: &str = ".bin";

fn main() {
    env_logger::init();
    let dir = env::args().nth(1).unwrap_or_else(|| "compliance".to_string());
    let filter = env::args().nth(2);
    if let Err(err) = run_suite(Path::new(&dir), filter.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_suite(root: &Path, filter: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    if !root.exists() {
        return Err(format!("{} does not exist", root.display()).into());
    }

    let cases = collect_cases(root, filter)?;
    if cases.is_empty() {
        match filter {
            Some(pattern) => println!(
                "No *{SUFFIX} programs matching '{pattern}' under {}",
                root.display()
            ),
            None => println!("No *{SUFFIX} programs found under {}", root.display()),
        }
        return Ok(());
    }

    println!("Discovered {} *{SUFFIX} programs under {}", cases.len(), root.display());

    let mut pass = 0usize;
    let mut fail = Vec::new();

    for case in &cases {
        let name = case
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        print!("[RUN] {name} ... ");
        let start = Instant::now();
        match run_case(case) {
            Ok((TestResult::Pass, steps)) => {
                pass += 1;
                println!("PASS (STEPS: {}, {:?})", steps, start.elapsed());
            }
            Ok((result, steps)) => {
                println!("{:?} (STEPS: {}, {:?})", result, steps, start.elapsed());
                fail.push((name, format!("{:?}", result)));
            }
            Err(err) => {
                println!("ERROR: {err}");
                fail.push((name, err.to_string()));
            }
        }
    }

    println!("\nSummary: {} passed / {} failed", pass, fail.len());
    if !fail.is_empty() {
        println!("Failed cases:");
        for (name, reason) in &fail {
            println!("  {name}: {reason}");
        }
        return Err("compliance suite has failures".into());
    }

    Ok(())
}

fn collect_cases(root: &Path, filter: Option<&str>) -> io::Result<Vec<PathBuf>> {
    let mut cases = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.ends_with(SUFFIX) {
            if let Some(pattern) = filter {
                if !name.contains(pattern) {
                    continue;
                }
            }
            cases.push(path);
        }
    }
    cases.sort();
    Ok(cases)
}

/// 返回结果与最终 PC（即 STEPS）
fn run_case(path: &Path) -> Result<(TestResult, u32), Box<dyn std::error::Error>> {
    let config = SimConfig::new().with_bin_path(path.to_string_lossy().into_owned());
    let mut env = SimEnv::from_config(config)?;
    let result = env.run_compliance()?;
    Ok((result, env.cpu.pc()))
}
