use clap::Parser as ClapParser;
use std::process;

use heap::HeapSettings;
use vm::{InterpretResult, VM, VMCreateInfo, demos};

const EXIT_USAGE: i32 = 64;
const EXIT_COMPILE: i32 = 65;
const EXIT_RUNTIME: i32 = 70;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Demo programs to run in order (all of them if none are given)
    #[arg(required = false, help = "Names of built-in demo programs")]
    demos: Vec<String>,

    #[arg(long, help = "List the built-in demo programs and exit")]
    list: bool,

    #[arg(long, help = "Collect garbage on every allocation")]
    stress_gc: bool,

    #[arg(long, default_value_t = 2, help = "Worker threads delivering actor messages")]
    workers: usize,

    #[arg(long, help = "Bytes allocated before the first collection")]
    initial_threshold: Option<usize>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list {
        for demo in demos::DEMOS {
            println!("{:<12} {}", demo.name, demo.about);
        }
        return;
    }

    let selected: Vec<&demos::Demo> = if cli.demos.is_empty() {
        demos::DEMOS.iter().collect()
    } else {
        cli.demos
            .iter()
            .map(|name| {
                demos::find(name).unwrap_or_else(|| {
                    eprintln!("Unknown demo '{name}'. Try --list.");
                    process::exit(EXIT_USAGE);
                })
            })
            .collect()
    };

    let defaults = HeapSettings::default();
    let info = VMCreateInfo {
        heap: HeapSettings {
            stress_gc: cli.stress_gc,
            initial_threshold: cli.initial_threshold.unwrap_or(defaults.initial_threshold),
            ..defaults
        },
        workers: cli.workers,
        ..VMCreateInfo::default()
    };
    let vm = match VM::new(info) {
        Ok(vm) => vm,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(EXIT_USAGE);
        }
    };

    for demo in selected {
        println!("== {} ==", demo.name);
        for stage in demo.stages {
            let code = match vm.interpret_with(|session| Ok(stage(session))) {
                InterpretResult::Ok => None,
                InterpretResult::CompileError(_) => Some(EXIT_COMPILE),
                InterpretResult::RuntimeError(_) => Some(EXIT_RUNTIME),
            };
            if let Some(code) = code {
                process::exit(code);
            }
            vm.wait_idle();
        }
    }

    let stats = vm.stats();
    log::debug!(
        "{} collections freed {} objects ({} bytes)",
        stats.collections,
        stats.objects_freed,
        stats.bytes_freed
    );
}
